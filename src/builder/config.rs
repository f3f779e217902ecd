//! Serializable part of a machine definition.
//!
//! Entry actions are code and cannot be loaded from data, but everything
//! else about a machine can: the initial state, the final state(s), the
//! starting context and the reentry policy.

use crate::effects::ReentryPolicy;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// One final state or several.
///
/// Both spellings normalize to a list, so `"DONE"` and `["DONE"]` describe
/// the same machine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Finals<S> {
    One(S),
    Many(Vec<S>),
}

impl<S> Finals<S> {
    pub fn into_vec(self) -> Vec<S> {
        match self {
            Self::One(state) => vec![state],
            Self::Many(states) => states,
        }
    }
}

impl<S> From<Vec<S>> for Finals<S> {
    fn from(states: Vec<S>) -> Self {
        Self::Many(states)
    }
}

impl From<&str> for Finals<String> {
    fn from(state: &str) -> Self {
        Self::One(state.to_string())
    }
}

impl From<String> for Finals<String> {
    fn from(state: String) -> Self {
        Self::One(state)
    }
}

impl<const N: usize> From<[&str; N]> for Finals<String> {
    fn from(states: [&str; N]) -> Self {
        Self::Many(states.iter().map(|state| state.to_string()).collect())
    }
}

/// Static machine definition, loadable from JSON.
///
/// ```rust
/// use micromachine::builder::MachineConfig;
/// use micromachine::effects::ReentryPolicy;
/// use serde_json::Value;
///
/// let config: MachineConfig<String, Value> = MachineConfig::from_json(
///     r#"{ "initial": "INITIAL", "final": "PEOPLE_LOADED", "context": { "people": [] } }"#,
/// )
/// .unwrap();
///
/// assert_eq!(config.finals.into_vec(), vec!["PEOPLE_LOADED".to_string()]);
/// assert_eq!(config.policy, ReentryPolicy::Permissive);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MachineConfig<S, C> {
    pub initial: S,

    #[serde(rename = "final")]
    pub finals: Finals<S>,

    pub context: C,

    #[serde(default)]
    pub policy: ReentryPolicy,
}

impl<S, C> MachineConfig<S, C>
where
    S: DeserializeOwned,
    C: DeserializeOwned,
{
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
