//! People Loader
//!
//! This example loads a list of people, then each person's city, and
//! renders progress from a binding while the machines run.
//!
//! Key concepts:
//! - Declaring machines with the builder and a typed context
//! - Composing machines that run in sequence
//! - Observing progress through a watch channel
//! - Branching on the outcome with `run_machine`
//!
//! Run with: cargo run --example people_loader

use micromachine::{
    compose, run_machine, Context, Machine, MachineBinding, MachineBuilder, MachineError,
    StateMachine,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Person {
    name: String,
    age: u32,
}

// Fields left as `None` in a partial update keep their current value.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct Directory {
    people: Option<Vec<Person>>,
    cities: Option<Vec<String>>,
    error: Option<String>,
}

impl Context for Directory {
    fn merge(&mut self, partial: Self) {
        if partial.people.is_some() {
            self.people = partial.people;
        }
        if partial.cities.is_some() {
            self.cities = partial.cities;
        }
        if partial.error.is_some() {
            self.error = partial.error;
        }
    }
}

async fn fetch_people() -> Result<Vec<Person>, MachineError> {
    tokio::time::sleep(Duration::from_millis(200)).await;
    Ok(vec![
        Person {
            name: "Thomas".into(),
            age: 22,
        },
        Person {
            name: "Fede".into(),
            age: 35,
        },
    ])
}

async fn fetch_cities(people: &[Person]) -> Result<Vec<String>, String> {
    tokio::time::sleep(Duration::from_millis(200)).await;
    if people.is_empty() {
        return Err("nobody to look up".into());
    }
    Ok(people.iter().map(|_| "Rosario".to_string()).collect())
}

fn people_machine() -> Result<StateMachine<String, Directory>, Box<dyn std::error::Error>> {
    let machine = MachineBuilder::<String, Directory>::new()
        .context(Directory::default())
        .initial("INITIAL")
        .final_state("PEOPLE_LOADED")
        .state("INITIAL", |machine, _| async move {
            machine.transition("PEOPLE_LOADING", None).await
        })
        .state("PEOPLE_LOADING", |machine, _| async move {
            let people = fetch_people().await?;
            let partial = Directory {
                people: Some(people),
                ..Default::default()
            };
            machine.transition("PEOPLE_LOADED", Some(partial)).await
        })
        .terminal("PEOPLE_LOADED")
        .build()?;
    Ok(machine)
}

fn cities_machine(
    people: Arc<parking_lot::Mutex<Vec<Person>>>,
) -> Result<StateMachine<String, Directory>, Box<dyn std::error::Error>> {
    let machine = MachineBuilder::<String, Directory>::new()
        .context(Directory::default())
        .initial("CITIES_LOADING")
        .final_state("CITIES_LOADED")
        .state("CITIES_LOADING", move |machine, _| {
            let people = people.lock().clone();
            async move {
                match fetch_cities(&people).await {
                    Ok(cities) => {
                        let partial = Directory {
                            cities: Some(cities),
                            ..Default::default()
                        };
                        machine.transition("CITIES_LOADED", Some(partial)).await
                    }
                    Err(error) => {
                        let partial = Directory {
                            error: Some(error),
                            ..Default::default()
                        };
                        machine.transition("CITIES_FAILED", Some(partial)).await
                    }
                }
            }
        })
        .terminal("CITIES_LOADED")
        .terminal("CITIES_FAILED")
        .build()?;
    Ok(machine)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== People Loader Example ===\n");

    // Each machine owns its context, so the second one gets the people
    // list through shared state filled by a listener on the first.
    let loaded = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let people = people_machine()?;
    let sink = Arc::clone(&loaded);
    people.on_terminated(move |event| {
        if let Some(people) = &event.context.people {
            *sink.lock() = people.clone();
        }
    });

    let directory = compose(vec![
        Arc::new(people) as Arc<dyn Machine<Directory>>,
        Arc::new(cities_machine(loaded)?),
    ])?;

    let binding = MachineBinding::new(directory);
    let mut progress = binding.subscribe();
    let renderer = tokio::spawn(async move {
        while progress.changed().await.is_ok() {
            let snapshot = progress.borrow_and_update().clone();
            println!(
                "state: {:<16} success: {:<5} terminated: {}",
                snapshot.state.unwrap_or_default(),
                snapshot.success,
                snapshot.terminated
            );
            if snapshot.terminated {
                break;
            }
        }
    });

    let Some(machine) = binding.machine() else {
        return Ok(());
    };
    let summary = run_machine(
        machine.as_ref(),
        None,
        |event| async move {
            let people = event.context.people.unwrap_or_default();
            let cities = event.context.cities.unwrap_or_default();
            people
                .iter()
                .zip(&cities)
                .map(|(person, city)| {
                    format!("{} ({}) lives in {}", person.name, person.age, city)
                })
                .collect::<Vec<_>>()
                .join("\n")
        },
        |event| async move {
            format!(
                "stopped in {}: {}",
                event.state,
                event.context.error.unwrap_or_default()
            )
        },
    )
    .await?;

    renderer.await?;

    println!("\n{}", summary.unwrap_or_else(|| "never finished".into()));
    Ok(())
}
