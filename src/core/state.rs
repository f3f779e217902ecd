//! State identifier trait.
//!
//! A state identifier names a node in a machine. Identity is by equality;
//! the display name is what shows up in events, errors and logs.

use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Debug;

/// Trait for values that identify a state in a machine.
///
/// Plain `String` identifiers work out of the box. For a closed set of
/// states, declare an enum with [`state_enum!`](crate::state_enum) or
/// implement the trait by hand.
///
/// Identifiers are copied into history and events, compared on every
/// lookup and on the self-transition check, and may appear in a
/// [`MachineConfig`](crate::builder::MachineConfig), hence the bounds.
///
/// ```rust
/// use micromachine::core::State;
/// use serde::{Deserialize, Serialize};
///
/// // Variant names differ from the names reported in events.
/// #[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
/// enum Loader {
///     Idle,
///     Fetching { page: u32 },
///     Loaded,
/// }
///
/// impl State for Loader {
///     fn name(&self) -> &str {
///         match self {
///             Self::Idle => "IDLE",
///             Self::Fetching { .. } => "FETCHING",
///             Self::Loaded => "LOADED",
///         }
///     }
/// }
///
/// assert_eq!(Loader::Fetching { page: 2 }.name(), "FETCHING");
/// ```
pub trait State:
    Clone + PartialEq + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Get the state's name for display/logging.
    fn name(&self) -> &str;
}

impl State for String {
    fn name(&self) -> &str {
        self.as_str()
    }
}
