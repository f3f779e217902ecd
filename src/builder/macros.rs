//! Macros for ergonomic state machine construction.

/// Declare an enum of state identifiers and implement [`State`](crate::core::State) for it.
///
/// The optional `final:` list generates a `finals()` constructor that can
/// be handed straight to the builder.
///
/// # Example
///
/// ```
/// use micromachine::state_enum;
/// use micromachine::core::State;
///
/// state_enum! {
///     pub enum LoaderState {
///         Initial,
///         Loading,
///         Loaded,
///         Failed,
///     }
///     final: [Loaded]
/// }
///
/// assert_eq!(LoaderState::Loading.name(), "Loading");
/// assert_eq!(LoaderState::finals(), vec![LoaderState::Loaded]);
/// ```
#[macro_export]
macro_rules! state_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $(
                $(#[$variant_meta:meta])*
                $variant:ident
            ),* $(,)?
        }

        $(final: [$($final:ident),* $(,)?])?
    ) => {
        #[derive(Clone, PartialEq, Debug, serde::Serialize, serde::Deserialize)]
        $(#[$meta])*
        $vis enum $name {
            $(
                $(#[$variant_meta])*
                $variant
            ),*
        }

        impl $crate::core::State for $name {
            fn name(&self) -> &str {
                match self {
                    $(Self::$variant => stringify!($variant)),*
                }
            }
        }

        impl $name {
            /// States listed under `final:` in the declaration.
            #[allow(dead_code)]
            pub fn finals() -> Vec<Self> {
                vec![$($(Self::$final),*)?]
            }
        }
    };
}
