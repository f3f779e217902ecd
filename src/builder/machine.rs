//! Builder for declaring state machines.

use crate::builder::config::{Finals, MachineConfig};
use crate::builder::error::{BuildError, BuildErrors};
use crate::core::{Context, State};
use crate::effects::{MachineHandle, MachineResult, ReentryPolicy, StateMachine, StateNode};
use std::future::Future;
use stillwater::validation::Validation;
use stillwater::NonEmptyVec;
use tracing::debug;

/// Builder for constructing state machines with a fluent API.
///
/// Unlike [`StateMachine::add_state`], `build` validates the whole
/// definition and reports every problem at once.
///
/// # Example
///
/// ```rust
/// use micromachine::builder::MachineBuilder;
/// use serde_json::{json, Value};
///
/// # futures::executor::block_on(async {
/// let machine = MachineBuilder::<String, Value>::new()
///     .context(json!({ "people": [] }))
///     .initial("INITIAL")
///     .final_states("PEOPLE_LOADED")
///     .state("INITIAL", |machine, _| async move {
///         let people = json!([{ "name": "Thomas", "age": 22 }]);
///         machine
///             .transition("PEOPLE_LOADED", Some(json!({ "people": people })))
///             .await
///     })
///     .terminal("PEOPLE_LOADED")
///     .build()
///     .unwrap();
///
/// machine.start(None).await.unwrap();
/// assert!(machine.success());
/// # });
/// ```
pub struct MachineBuilder<S: State, C: Context> {
    initial: Option<S>,
    finals: Vec<S>,
    context: Option<C>,
    policy: ReentryPolicy,
    states: Vec<StateNode<S, C>>,
}

impl<S: State, C: Context> MachineBuilder<S, C> {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            initial: None,
            finals: Vec::new(),
            context: None,
            policy: ReentryPolicy::default(),
            states: Vec::new(),
        }
    }

    /// Start from a loaded configuration; states are added afterwards.
    pub fn from_config(config: MachineConfig<S, C>) -> Self {
        Self::new().config(config)
    }

    /// Replace initial state, finals, context and policy with `config`.
    pub fn config(mut self, config: MachineConfig<S, C>) -> Self {
        self.initial = Some(config.initial);
        self.finals = config.finals.into_vec();
        self.context = Some(config.context);
        self.policy = config.policy;
        self
    }

    /// Set the initial context (required).
    pub fn context(mut self, context: C) -> Self {
        self.context = Some(context);
        self
    }

    /// Set the initial state (required).
    pub fn initial(mut self, state: impl Into<S>) -> Self {
        self.initial = Some(state.into());
        self
    }

    /// Add one final state.
    pub fn final_state(mut self, state: impl Into<S>) -> Self {
        self.finals.push(state.into());
        self
    }

    /// Add one or several final states.
    pub fn final_states(mut self, states: impl Into<Finals<S>>) -> Self {
        self.finals.extend(states.into().into_vec());
        self
    }

    pub fn policy(mut self, policy: ReentryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Declare a state with an entry action.
    pub fn state<F, Fut>(mut self, name: impl Into<S>, action: F) -> Self
    where
        F: Fn(MachineHandle<S, C>, C) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = MachineResult<()>> + Send + 'static,
    {
        self.states.push(StateNode::new(name, action));
        self
    }

    /// Declare a terminal state.
    pub fn terminal(mut self, name: impl Into<S>) -> Self {
        self.states.push(StateNode::terminal(name));
        self
    }

    /// Add a pre-built node.
    pub fn add_state(mut self, node: StateNode<S, C>) -> Self {
        self.states.push(node);
        self
    }

    /// Build the state machine.
    /// Returns every validation failure if the definition is inconsistent.
    pub fn build(self) -> Result<StateMachine<S, C>, BuildErrors> {
        if let Validation::Failure(errors) = self.validate() {
            return Err(BuildErrors::new(errors.iter().cloned().collect()));
        }

        let initial = self.initial.ok_or(BuildError::MissingInitialState)?;
        let context = self.context.ok_or(BuildError::MissingContext)?;

        let machine = StateMachine::with_policy(initial, self.finals, context, self.policy);
        for node in self.states {
            machine.add_state(node);
        }

        debug!(
            machine = %machine.id(),
            initial = machine.initial().name(),
            states = machine.states().len(),
            "machine built"
        );
        Ok(machine)
    }

    /// Check the definition, accumulating ALL problems.
    pub fn validate(&self) -> Validation<(), NonEmptyVec<BuildError>> {
        let mut checks: Vec<Validation<(), NonEmptyVec<BuildError>>> = Vec::new();

        if self.initial.is_none() {
            checks.push(Validation::fail(BuildError::MissingInitialState));
        }

        if self.context.is_none() {
            checks.push(Validation::fail(BuildError::MissingContext));
        }

        if self.finals.is_empty() {
            checks.push(Validation::fail(BuildError::NoFinalStates));
        }

        if self.states.is_empty() {
            checks.push(Validation::fail(BuildError::NoStates));
            return Validation::all_vec(checks).map(|_| ());
        }

        let mut seen: Vec<&S> = Vec::new();
        let mut reported: Vec<&S> = Vec::new();
        for node in &self.states {
            let name = node.name();
            if !seen.contains(&name) {
                seen.push(name);
            } else if !reported.contains(&name) {
                reported.push(name);
                checks.push(Validation::fail(BuildError::DuplicateState {
                    name: name.name().to_string(),
                }));
            }
        }

        if let Some(initial) = &self.initial {
            if self.find(initial).is_none() {
                checks.push(Validation::fail(BuildError::UnknownInitialState {
                    name: initial.name().to_string(),
                }));
            }
        }

        for state in &self.finals {
            let check = match self.find(state) {
                None => Validation::fail(BuildError::UnknownFinalState {
                    name: state.name().to_string(),
                }),
                Some(node) if !node.is_terminal() => {
                    Validation::fail(BuildError::FinalStateNotTerminal {
                        name: state.name().to_string(),
                    })
                }
                Some(_) => Validation::success(()),
            };
            checks.push(check);
        }

        Validation::all_vec(checks).map(|_| ())
    }

    fn find(&self, name: &S) -> Option<&StateNode<S, C>> {
        self.states.iter().find(|node| node.name() == name)
    }
}

impl<S: State, C: Context> Default for MachineBuilder<S, C> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::MachineError;
    use serde_json::{json, Value};

    type JsonBuilder = MachineBuilder<String, Value>;

    #[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Person {
        name: String,
        age: u32,
    }

    async fn fetch_people() -> Vec<Person> {
        vec![Person {
            name: "Thomas".into(),
            age: 22,
        }]
    }

    fn people_builder() -> JsonBuilder {
        MachineBuilder::new()
            .context(json!({ "people": [] }))
            .initial("INITIAL")
            .state("INITIAL", |machine, _| async move {
                machine.transition("PEOPLE_LOADING", None).await
            })
            .state("PEOPLE_LOADING", |machine, _| async move {
                let people = fetch_people().await;
                machine
                    .transition("PEOPLE_LOADED", Some(json!({ "people": people })))
                    .await
            })
            .terminal("PEOPLE_LOADED")
    }

    #[test]
    fn builder_validates_required_fields() {
        let errors = JsonBuilder::new().build().unwrap_err();

        assert!(errors.contains(&BuildError::MissingInitialState));
        assert!(errors.contains(&BuildError::MissingContext));
        assert!(errors.contains(&BuildError::NoFinalStates));
        assert!(errors.contains(&BuildError::NoStates));
        assert_eq!(errors.len(), 4);
    }

    #[test]
    fn builder_reports_every_inconsistency_at_once() {
        let errors = JsonBuilder::new()
            .context(json!({}))
            .initial("START")
            .final_states(["DONE", "LOADING"])
            .state("LOADING", |machine, _| async move {
                machine.transition("LOADED", None).await
            })
            .terminal("LOADED")
            .terminal("LOADED")
            .terminal("LOADED")
            .build()
            .unwrap_err();

        assert_eq!(errors.len(), 4);
        assert!(errors.contains(&BuildError::DuplicateState {
            name: "LOADED".into()
        }));
        assert!(errors.contains(&BuildError::UnknownInitialState {
            name: "START".into()
        }));
        assert!(errors.contains(&BuildError::UnknownFinalState {
            name: "DONE".into()
        }));
        assert!(errors.contains(&BuildError::FinalStateNotTerminal {
            name: "LOADING".into()
        }));
    }

    #[tokio::test]
    async fn builder_runs_the_people_scenario() {
        let machine = people_builder()
            .final_state("PEOPLE_LOADED")
            .build()
            .unwrap();

        machine.start(None).await.unwrap();

        let context = machine.context();
        assert_eq!(
            machine.history().names(),
            vec!["INITIAL", "PEOPLE_LOADING", "PEOPLE_LOADED"]
        );
        assert_eq!(context["people"].as_array().map(Vec::len), Some(1));
        assert_eq!(context["people"][0]["name"], "Thomas");
        assert_eq!(context["people"][0]["age"], 22);
        assert!(machine.success());
    }

    #[tokio::test]
    async fn single_final_behaves_like_a_list_of_one() {
        let single = people_builder()
            .final_states("PEOPLE_LOADED")
            .build()
            .unwrap();
        let list = people_builder()
            .final_states(vec!["PEOPLE_LOADED".to_string()])
            .build()
            .unwrap();

        assert_eq!(single.finals(), list.finals());

        single.start(None).await.unwrap();
        list.start(None).await.unwrap();

        assert_eq!(single.success(), list.success());
        assert_eq!(single.terminated(), list.terminated());
        assert_eq!(single.history().names(), list.history().names());
        assert_eq!(single.context(), list.context());
    }

    #[tokio::test]
    async fn built_machine_still_rejects_unknown_states_at_runtime() {
        let machine = JsonBuilder::new()
            .context(json!({}))
            .initial("INITIAL")
            .final_state("FINAL")
            .state("INITIAL", |machine, _| async move {
                machine.transition("FINLA", None).await
            })
            .terminal("FINAL")
            .build()
            .unwrap();

        let result = machine.start(None).await;

        assert!(matches!(result, Err(MachineError::InvalidState { .. })));
    }

    #[test]
    fn config_supplies_the_static_definition() {
        let config: MachineConfig<String, Value> = MachineConfig::from_json(
            r#"{ "initial": "INITIAL", "final": "DONE", "context": { "n": 1 }, "policy": "exclusive" }"#,
        )
        .unwrap();

        let machine = MachineBuilder::from_config(config)
            .state("INITIAL", |machine, _| async move {
                machine.transition("DONE", None).await
            })
            .terminal("DONE")
            .build()
            .unwrap();

        assert_eq!(machine.initial(), "INITIAL");
        assert_eq!(machine.finals(), ["DONE".to_string()]);
        assert_eq!(machine.context(), json!({ "n": 1 }));
        assert_eq!(machine.policy(), ReentryPolicy::Exclusive);
    }
}
