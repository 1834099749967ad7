use crate::{Error, Result};
use serde_json::Value;

pub type ParamMap = serde_json::Map<String, Value>;

/// Parameters every request must carry, in invocation order. This is the
/// later simulator revision's list; older deployments override it through
/// configuration.
pub const DEFAULT_REQUIRED_PARAMS: &[&str] = &[
    "hatchers",
    "proposals",
    "hatch_tribute",
    "vesting_80p_unlocked",
    "exit_tribute",
    "kappa",
    "days_to_80p_of_max_voting_weight",
    "max_proposal_request",
    "timesteps_days",
    "random_seed",
];

/// Ordered required-parameter list. Kept as data rather than a constant
/// because the list has changed between simulator revisions.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    keys: Vec<String>,
}

impl Default for ParamSpec {
    fn default() -> Self {
        Self::new(DEFAULT_REQUIRED_PARAMS.iter().map(|s| (*s).to_owned()))
    }
}

impl ParamSpec {
    pub fn new(keys: impl IntoIterator<Item = String>) -> Self {
        Self {
            keys: keys.into_iter().collect(),
        }
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Check that every required key is present and truthy, reporting the
    /// first offender in list order.
    pub fn validate(&self, body: &ParamMap) -> Result<()> {
        for key in &self.keys {
            if !body.get(key.as_str()).is_some_and(truthy) {
                return Err(Error::MissingParameter(key.clone()));
            }
        }
        Ok(())
    }

    /// Build the canonical invocation for a request, validating it first.
    /// Extra keys in the body are ignored.
    pub fn invocation(&self, body: &ParamMap) -> Result<Invocation> {
        let mut args = Vec::with_capacity(self.keys.len() * 2);
        for key in &self.keys {
            let value = body
                .get(key.as_str())
                .filter(|v| truthy(v))
                .ok_or_else(|| Error::MissingParameter(key.clone()))?;
            args.push(format!("--{key}"));
            args.push(render(value));
        }
        Ok(Invocation { args })
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Values are interpolated as provided, no normalization: `0.20` and `0.2`
/// are distinct invocations and therefore distinct cache entries.
fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// The exact `--key value` argument list handed to the simulation process.
///
/// The fingerprint is derived from this same list, so the cache key can
/// never drift from what would be executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    args: Vec<String>,
}

impl Invocation {
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Command-line form, `--key value ` per parameter.
    pub fn command_line(&self) -> String {
        let mut out = String::new();
        for arg in &self.args {
            out.push_str(arg);
            out.push(' ');
        }
        out
    }

    pub fn fingerprint(&self) -> Fingerprint {
        let hash = blake3::hash(self.command_line().as_bytes());
        Fingerprint(hex::encode(hash.as_bytes()))
    }
}

/// Hex-encoded content hash identifying a request by its required
/// parameters. Doubles as the cache file name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
