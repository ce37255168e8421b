//! Resource state upgrades.
//!
//! The host asks for an upgrade whenever the stored state was written with a
//! schema version that may differ from the current one. A same-version
//! request is served by decoding and re-encoding the raw state; any other
//! version is routed to the resource's [`ResourceStateUpgrader`] for that
//! version.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::codec::{DynamicValue, RawState};
use crate::context::Context;
use crate::data::State;
use crate::diag::Diagnostics;
use crate::schema::Schema;

/// Signature of a state upgrade function.
pub type StateUpgradeFn =
    dyn Fn(&Context, UpgradeResourceStateRequest, &mut UpgradeResourceStateResponse) + Send + Sync;

/// Upgrades state written at one prior version to the current schema.
///
/// Only the upgrader for the stored version runs, so each one must carry the
/// state all the way to the current version.
#[derive(Clone)]
pub struct ResourceStateUpgrader {
    /// Schema of the prior version. When set, the request carries a typed
    /// [`State`] decoded with it; otherwise only the raw state is available.
    pub prior_schema: Option<Schema>,
    upgrader: Arc<StateUpgradeFn>,
}

impl ResourceStateUpgrader {
    /// An upgrader working from the raw prior state.
    pub fn new<F>(upgrader: F) -> Self
    where
        F: Fn(&Context, UpgradeResourceStateRequest, &mut UpgradeResourceStateResponse)
            + Send
            + Sync
            + 'static,
    {
        Self {
            prior_schema: None,
            upgrader: Arc::new(upgrader),
        }
    }

    /// Decode the prior state with `schema` before calling the upgrader.
    pub fn with_prior_schema(mut self, schema: Schema) -> Self {
        self.prior_schema = Some(schema);
        self
    }

    /// Run the upgrade function.
    pub fn upgrade(
        &self,
        ctx: &Context,
        req: UpgradeResourceStateRequest,
        resp: &mut UpgradeResourceStateResponse,
    ) {
        (self.upgrader)(ctx, req, resp)
    }
}

impl fmt::Debug for ResourceStateUpgrader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceStateUpgrader")
            .field("prior_schema", &self.prior_schema)
            .finish_non_exhaustive()
    }
}

/// Input to a state upgrade function.
#[derive(Debug, Clone)]
pub struct UpgradeResourceStateRequest {
    /// The stored state as written by the host.
    pub raw_state: RawState,
    /// The stored state decoded with the upgrader's prior schema, if it
    /// declares one.
    pub state: Option<State>,
}

/// The upgraded state.
#[derive(Debug, Clone)]
pub enum UpgradeOutput {
    /// An already encoded value, returned to the host as is.
    Raw(DynamicValue),
    /// A typed state, encoded with its own schema.
    Typed(State),
}

/// Output of a state upgrade function.
#[derive(Debug, Clone, Default)]
pub struct UpgradeResourceStateResponse {
    /// The upgraded state. Leaving it unset is an error.
    pub output: Option<UpgradeOutput>,
    /// Diagnostics to report.
    pub diagnostics: Diagnostics,
}

/// Where an upgrade request ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeStatus {
    /// The stored version is current; the state was passed through.
    NotNeeded,
    /// No upgrader exists for the stored version.
    NoUpgraderAvailable,
    /// The provider's upgrade function is running.
    Upgrading,
    /// The state was upgraded.
    Upgraded,
    /// Decoding, the upgrade function or encoding failed.
    Failed,
}

impl fmt::Display for UpgradeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UpgradeStatus::NotNeeded => "not_needed",
            UpgradeStatus::NoUpgraderAvailable => "no_upgrader_available",
            UpgradeStatus::Upgrading => "upgrading",
            UpgradeStatus::Upgraded => "upgraded",
            UpgradeStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Result of an upgrade attempt.
#[derive(Debug, Clone)]
pub struct UpgradeResult {
    /// Final status. Never [`UpgradeStatus::Upgrading`].
    pub status: UpgradeStatus,
    /// The encoded upgraded state, set on success.
    pub upgraded_state: Option<DynamicValue>,
    /// Diagnostics from decoding, the upgrade function and encoding.
    pub diagnostics: Diagnostics,
}

impl UpgradeResult {
    fn failed(diagnostics: Diagnostics) -> Self {
        Self {
            status: UpgradeStatus::Failed,
            upgraded_state: None,
            diagnostics,
        }
    }
}

/// Re-encode `raw_state` with the current schema. Used when the stored
/// version already matches.
pub fn pass_through(schema: &Schema, raw_state: &RawState) -> UpgradeResult {
    trace!(
        "UpgradeResourceState request version matches current Schema version, \
         using framework defined passthrough implementation"
    );

    let mut diagnostics = Diagnostics::new();
    let value = match raw_state.decode(&schema.terraform_type()) {
        Ok(value) => value,
        Err(err) => {
            diagnostics.add_error(
                "Unable to Read Previously Saved State for UpgradeResourceState",
                format!(
                    "There was an error reading the saved resource state using the current \
                     resource schema.\n\nIf this resource state was last refreshed with Terraform \
                     CLI 0.11 and earlier, it must be refreshed or applied with an older provider \
                     version first. If you manually modified the resource state, you will need to \
                     manually modify it to match the current resource schema. Otherwise, please \
                     report this to the provider developer:\n\n{}",
                    err
                ),
            );
            return UpgradeResult::failed(diagnostics);
        }
    };

    match DynamicValue::encode(&value) {
        Ok(encoded) => UpgradeResult {
            status: UpgradeStatus::NotNeeded,
            upgraded_state: Some(encoded),
            diagnostics,
        },
        Err(err) => {
            diagnostics.add_error(
                "Unable to Convert Previously Saved State for UpgradeResourceState",
                format!(
                    "There was an error converting the saved resource state using the current \
                     resource schema. This is always an issue in the Terraform Provider SDK used \
                     to implement the resource and should be reported to the provider \
                     developers.\n\nPlease report this to the provider developer:\n\n{}",
                    err
                ),
            );
            UpgradeResult::failed(diagnostics)
        }
    }
}

fn no_upgrader(version: i64, implemented: bool) -> UpgradeResult {
    let mut diagnostics = Diagnostics::new();
    diagnostics.add_error(
        "Unable to Upgrade Resource State",
        format!(
            "This resource was implemented {} an UpgradeState() method, however Terraform was \
             expecting an implementation for version {} upgrade.\n\nThis is always an issue with \
             the Terraform Provider and should be reported to the provider developer.",
            if implemented { "with" } else { "without" },
            version
        ),
    );
    UpgradeResult {
        status: UpgradeStatus::NoUpgraderAvailable,
        upgraded_state: None,
        diagnostics,
    }
}

/// Run the upgrader registered for `version`.
///
/// `upgraders` is `None` when the resource has no upgrade capability at all.
pub fn run_upgrader(
    ctx: &Context,
    upgraders: Option<&BTreeMap<i64, ResourceStateUpgrader>>,
    version: i64,
    raw_state: &RawState,
) -> UpgradeResult {
    let Some(upgraders) = upgraders else {
        return no_upgrader(version, false);
    };
    let Some(upgrader) = upgraders.get(&version) else {
        return no_upgrader(version, true);
    };

    let mut diagnostics = Diagnostics::new();
    let mut req = UpgradeResourceStateRequest {
        raw_state: raw_state.clone(),
        state: None,
    };

    if let Some(prior_schema) = &upgrader.prior_schema {
        trace!(
            "Initializing populated UpgradeResourceStateRequest state from provider defined \
             prior schema and request RawState"
        );
        match raw_state.decode(&prior_schema.terraform_type()) {
            Ok(value) => req.state = Some(State::new(prior_schema.clone(), value)),
            Err(err) => {
                diagnostics.add_error(
                    "Unable to Read Previously Saved State for UpgradeResourceState",
                    format!(
                        "There was an error reading the saved resource state using the prior \
                         resource schema defined for version {} upgrade.\n\nPlease report this to \
                         the provider developer:\n\n{}",
                        version, err
                    ),
                );
                return UpgradeResult::failed(diagnostics);
            }
        }
    }

    let mut resp = UpgradeResourceStateResponse::default();
    debug!(version, status = %UpgradeStatus::Upgrading, "Calling provider defined StateUpgrader");
    upgrader.upgrade(ctx, req, &mut resp);
    debug!(version, "Called provider defined StateUpgrader");

    diagnostics.append(resp.diagnostics);
    if diagnostics.has_error() {
        return UpgradeResult::failed(diagnostics);
    }

    let state = match resp.output {
        Some(UpgradeOutput::Raw(value)) => {
            trace!("UpgradeResourceStateResponse DynamicValue set, overriding State");
            return UpgradeResult {
                status: UpgradeStatus::Upgraded,
                upgraded_state: Some(value),
                diagnostics,
            };
        }
        Some(UpgradeOutput::Typed(state)) if !state.raw.is_null() => state,
        _ => {
            diagnostics.add_error(
                "Missing Upgraded Resource State",
                format!(
                    "After attempting a resource state upgrade to version {}, the provider did not \
                     return any state data. Preventing the unexpected loss of resource state data. \
                     This is always an issue with the Terraform Provider and should be reported to \
                     the provider developer.",
                    version
                ),
            );
            return UpgradeResult::failed(diagnostics);
        }
    };

    match DynamicValue::encode(&state.raw) {
        Ok(encoded) => UpgradeResult {
            status: UpgradeStatus::Upgraded,
            upgraded_state: Some(encoded),
            diagnostics,
        },
        Err(err) => {
            diagnostics.add_error(
                "Unable to Convert Upgraded Resource State",
                format!(
                    "An unexpected error was encountered when converting the state returned for \
                     version {} upgrade to a usable type. This is always an issue in the Terraform \
                     Provider SDK used to implement the resource and should be reported to the \
                     provider developers.\n\nPlease report this to the provider developer:\n\n{}",
                    version, err
                ),
            );
            UpgradeResult::failed(diagnostics)
        }
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;

    use super::*;
    use crate::schema::Attribute;
    use crate::value::Value;

    fn current_schema() -> Schema {
        Schema::new(1)
            .with_attribute("name", Attribute::required_string())
            .with_attribute("size", Attribute::optional_int64())
    }

    fn v0_schema() -> Schema {
        Schema::v0().with_attribute("name", Attribute::required_string())
    }

    #[test]
    fn test_pass_through_round_trips() {
        let schema = Schema::new(1).with_attribute("name", Attribute::required_string());
        let raw = RawState::from_json(br#"{"name":"x"}"#.to_vec());
        let result = pass_through(&schema, &raw);
        assert_eq!(result.status, UpgradeStatus::NotNeeded);
        assert!(result.diagnostics.is_empty());

        let value = result.upgraded_state.unwrap().decode(&schema.terraform_type()).unwrap();
        assert_eq!(value, Value::object([("name", Value::string("x"))]));
    }

    #[test]
    fn test_pass_through_is_byte_stable() {
        let schema = current_schema();
        let value = Value::object([("name", Value::string("x")), ("size", Value::int(3))]);
        let encoded = DynamicValue::encode(&value).unwrap();
        let raw = RawState::from_json(br#"{"name":"x","size":3}"#.to_vec());
        assert_eq!(pass_through(&schema, &raw).upgraded_state, Some(encoded));
    }

    #[test]
    fn test_pass_through_unreadable_state() {
        let raw = RawState::from_json(br#"{"unexpected":true}"#.to_vec());
        let result = pass_through(&current_schema(), &raw);
        assert_eq!(result.status, UpgradeStatus::Failed);
        assert_eq!(
            result.diagnostics.as_slice()[0].summary,
            "Unable to Read Previously Saved State for UpgradeResourceState"
        );
    }

    #[test]
    fn test_missing_upgrader() {
        let raw = RawState::from_json(br#"{"name":"x"}"#.to_vec());
        let ctx = Context::new();

        let result = run_upgrader(&ctx, None, 0, &raw);
        assert_eq!(result.status, UpgradeStatus::NoUpgraderAvailable);
        assert!(result.diagnostics.as_slice()[0]
            .detail
            .contains("implemented without an UpgradeState()"));

        let empty = BTreeMap::new();
        let result = run_upgrader(&ctx, Some(&empty), 0, &raw);
        assert_eq!(result.status, UpgradeStatus::NoUpgraderAvailable);
        assert!(result.diagnostics.as_slice()[0].detail.contains("version 0 upgrade"));
    }

    #[test]
    fn test_typed_upgrade_with_prior_schema() {
        #[derive(Deserialize)]
        struct V0 {
            name: String,
        }

        let upgrader = ResourceStateUpgrader::new(|_ctx, req, resp| {
            let prior: V0 = match req.state.as_ref().map(State::get::<V0>) {
                Some(Ok(prior)) => prior,
                Some(Err(diags)) => {
                    resp.diagnostics.append(diags);
                    return;
                }
                None => return,
            };
            let mut state = State::null(current_schema());
            resp.diagnostics.append(state.set(&json!({"name": prior.name, "size": 1})));
            resp.output = Some(UpgradeOutput::Typed(state));
        })
        .with_prior_schema(v0_schema());
        let upgraders = BTreeMap::from([(0, upgrader)]);

        let raw = RawState::from_json(br#"{"name":"x"}"#.to_vec());
        let result = run_upgrader(&Context::new(), Some(&upgraders), 0, &raw);
        assert_eq!(result.status, UpgradeStatus::Upgraded);
        let value = result
            .upgraded_state
            .unwrap()
            .decode(&current_schema().terraform_type())
            .unwrap();
        assert_eq!(value.attribute("size"), Some(&Value::int(1)));
    }

    #[test]
    fn test_raw_output_wins() {
        let encoded = DynamicValue::from_json(br#"{"name":"raw","size":null}"#.to_vec());
        let expected = encoded.clone();
        let upgrader = ResourceStateUpgrader::new(move |_ctx, _req, resp| {
            resp.output = Some(UpgradeOutput::Raw(encoded.clone()));
        });
        let upgraders = BTreeMap::from([(0, upgrader)]);

        let raw = RawState::from_json(br#"{"name":"x"}"#.to_vec());
        let result = run_upgrader(&Context::new(), Some(&upgraders), 0, &raw);
        assert_eq!(result.upgraded_state, Some(expected));
    }

    #[test]
    fn test_missing_output_prevents_state_loss() {
        let upgraders = BTreeMap::from([
            (0, ResourceStateUpgrader::new(|_ctx, _req, _resp| {})),
            (
                1,
                ResourceStateUpgrader::new(|_ctx, _req, resp| {
                    resp.output = Some(UpgradeOutput::Typed(State::null(current_schema())));
                }),
            ),
        ]);
        let raw = RawState::from_json(br#"{"name":"x"}"#.to_vec());
        for version in [0, 1] {
            let result = run_upgrader(&Context::new(), Some(&upgraders), version, &raw);
            assert_eq!(result.status, UpgradeStatus::Failed);
            assert_eq!(result.diagnostics.as_slice()[0].summary, "Missing Upgraded Resource State");
        }
    }

    #[test]
    fn test_upgrader_errors_are_returned() {
        let upgraders = BTreeMap::from([(
            0,
            ResourceStateUpgrader::new(|_ctx, _req, resp| {
                resp.diagnostics.add_error("Upgrade Failed", "cannot read legacy field");
            }),
        )]);
        let raw = RawState::from_json(br#"{"name":"x"}"#.to_vec());
        let result = run_upgrader(&Context::new(), Some(&upgraders), 0, &raw);
        assert_eq!(result.status, UpgradeStatus::Failed);
        assert_eq!(result.diagnostics.len(), 1);
        assert!(result.upgraded_state.is_none());
    }
}
