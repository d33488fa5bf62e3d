//! Deferred engine commands.
//!
//! UI-facing callers never touch the engine directly. They enqueue plain-data
//! [`SimCommand`]s at any time; the loop drains the queue at one defined point
//! per iteration and executes every drained command in submission order. A
//! failing command is logged and skipped without affecting the ones behind it.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use flowscope_types::{PhaseSpec, Rgb};
use thiserror::Error;
use tracing::warn;

use crate::gateway::{EngineGateway, EntityKind, EntitySpec, Field, FieldValue, GatewayError};

/// Structural problems with a command, caught before it is enqueued.
#[derive(Debug, Error)]
pub enum CommandError {
    /// A signal program with no phases.
    #[error("program for signal '{signal_id}' has no phases")]
    EmptyProgram {
        /// Target signal.
        signal_id: String,
    },

    /// A phase whose state string is empty.
    #[error("phase {index} for signal '{signal_id}' has an empty state string")]
    EmptyPhaseState {
        /// Target signal.
        signal_id: String,
        /// Offending phase index.
        index: usize,
    },

    /// A phase state string whose length does not match the signal layout.
    #[error(
        "phase {index} for signal '{signal_id}' has {actual} state codes, expected {expected}"
    )]
    WrongStateLength {
        /// Target signal.
        signal_id: String,
        /// Offending phase index.
        index: usize,
        /// Number of controlled indices of the signal.
        expected: usize,
        /// Number of state codes supplied.
        actual: usize,
    },

    /// A phase whose duration is not a strictly positive finite number.
    #[error("phase {index} for signal '{signal_id}' has invalid duration {duration_s}")]
    InvalidDuration {
        /// Target signal.
        signal_id: String,
        /// Offending phase index.
        index: usize,
        /// Supplied duration in seconds.
        duration_s: f64,
    },

    /// A command addressing a signal the scenario does not contain.
    #[error("unknown signal '{signal_id}'")]
    UnknownSignal {
        /// The unmatched id.
        signal_id: String,
    },

    /// An injection onto a route the scenario does not contain.
    #[error("unknown route '{route_id}'")]
    UnknownRoute {
        /// The unmatched id.
        route_id: String,
    },
}

/// Checks a phase program against the structural rules before submission.
///
/// `required_state_len` is the number of controlled indices of the target
/// signal; every phase state string must carry exactly that many codes.
pub fn validate_program(
    signal_id: &str,
    phases: &[PhaseSpec],
    required_state_len: usize,
) -> Result<(), CommandError> {
    if phases.is_empty() {
        return Err(CommandError::EmptyProgram {
            signal_id: signal_id.to_owned(),
        });
    }
    for (index, phase) in phases.iter().enumerate() {
        if phase.state.is_empty() {
            return Err(CommandError::EmptyPhaseState {
                signal_id: signal_id.to_owned(),
                index,
            });
        }
        let actual = phase.state.chars().count();
        if actual != required_state_len {
            return Err(CommandError::WrongStateLength {
                signal_id: signal_id.to_owned(),
                index,
                expected: required_state_len,
                actual,
            });
        }
        if !phase.duration_s.is_finite() || phase.duration_s <= 0.0 {
            return Err(CommandError::InvalidDuration {
                signal_id: signal_id.to_owned(),
                index,
                duration_s: phase.duration_s,
            });
        }
    }
    Ok(())
}

/// Attributes of a manually injected vehicle.
#[derive(Debug, Clone, PartialEq)]
pub struct InjectionRequest {
    /// Route the vehicle is inserted onto.
    pub route_id: String,
    /// Vehicle type to instantiate.
    pub type_id: String,
    /// Display color to apply after insertion, if any.
    pub color: Option<Rgb>,
    /// Length override in meters, if any.
    pub length_m: Option<f64>,
    /// Maximum speed override in m/s, if any.
    pub max_speed: Option<f64>,
}

/// One deferred engine mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum SimCommand {
    /// Cut the current phase of a signal short so the engine advances it on
    /// the next step.
    SwitchSignal {
        /// Target signal.
        signal_id: String,
    },

    /// Replace the phase program of a signal.
    ApplyProgram {
        /// Target signal.
        signal_id: String,
        /// The new program, already validated.
        phases: Vec<PhaseSpec>,
    },

    /// Insert one vehicle with optional cosmetic overrides.
    InjectVehicle {
        /// What to inject.
        request: InjectionRequest,
    },
}

/// FIFO of pending [`SimCommand`]s, shared between submitters and the loop.
#[derive(Debug, Default)]
pub struct CommandQueue {
    items: Mutex<Vec<SimCommand>>,
    manual_seq: AtomicU64,
}

impl CommandQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues a command for the next drain.
    ///
    /// A poisoned lock still yields the list; enqueue never drops work.
    pub fn submit(&self, command: SimCommand) {
        self.items
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(command);
    }

    /// Number of commands currently waiting.
    pub fn pending(&self) -> usize {
        self.items
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// Takes every pending command, oldest first.
    fn drain(&self) -> Vec<SimCommand> {
        let mut items = self
            .items
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        std::mem::take(&mut *items)
    }

    /// Drains the queue and executes each command against the engine.
    ///
    /// Commands run in submission order. A failing command is logged and
    /// dropped; execution continues with the next one. Returns how many
    /// commands executed cleanly.
    pub fn drain_and_execute(&self, gateway: &mut dyn EngineGateway) -> usize {
        let mut executed = 0_usize;
        for command in self.drain() {
            match self.execute(&command, gateway) {
                Ok(()) => executed = executed.saturating_add(1),
                Err(error) => {
                    warn!(error = %error, ?command, "Queued command failed");
                }
            }
        }
        executed
    }

    fn execute(
        &self,
        command: &SimCommand,
        gateway: &mut dyn EngineGateway,
    ) -> Result<(), GatewayError> {
        match command {
            SimCommand::SwitchSignal { signal_id } => gateway.set_field(
                EntityKind::Signal,
                signal_id,
                Field::PhaseDuration,
                FieldValue::Float(0.0),
            ),
            SimCommand::ApplyProgram { signal_id, phases } => {
                apply_program(gateway, signal_id, phases)
            }
            SimCommand::InjectVehicle { request } => {
                let id = format!("manual_{}", self.manual_seq.fetch_add(1, Ordering::Relaxed));
                inject_vehicle(gateway, &id, request)
            }
        }
    }
}

/// Replaces the program of a signal.
///
/// When the active program has more phases than the replacement, the phase
/// index is reset first so the engine never points past the new program.
fn apply_program(
    gateway: &mut dyn EngineGateway,
    signal_id: &str,
    phases: &[PhaseSpec],
) -> Result<(), GatewayError> {
    let current = gateway
        .get_field(EntityKind::Signal, signal_id, Field::PhaseCount)?
        .as_int()
        .unwrap_or(0);
    let current = usize::try_from(current).unwrap_or(0);
    if current > phases.len() {
        gateway.set_field(
            EntityKind::Signal,
            signal_id,
            Field::PhaseIndex,
            FieldValue::Int(0),
        )?;
    }
    gateway.set_field(
        EntityKind::Signal,
        signal_id,
        Field::Program,
        FieldValue::Phases(phases.to_vec()),
    )
}

fn inject_vehicle(
    gateway: &mut dyn EngineGateway,
    id: &str,
    request: &InjectionRequest,
) -> Result<(), GatewayError> {
    gateway.add_entity(&EntitySpec {
        id: id.to_owned(),
        route_id: request.route_id.clone(),
        type_id: request.type_id.clone(),
    })?;
    if let Some(color) = request.color {
        gateway.set_field(
            EntityKind::Vehicle,
            id,
            Field::Color,
            FieldValue::Color(color),
        )?;
    }
    if let Some(length_m) = request.length_m {
        gateway.set_field(
            EntityKind::Vehicle,
            id,
            Field::Length,
            FieldValue::Float(length_m),
        )?;
    }
    if let Some(max_speed) = request.max_speed {
        gateway.set_field(
            EntityKind::Vehicle,
            id,
            Field::MaxSpeed,
            FieldValue::Float(max_speed),
        )?;
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::gateway::{GatewayCall, ScriptedGateway};

    fn phase(state: &str, duration_s: f64) -> PhaseSpec {
        PhaseSpec::new(state.to_owned(), duration_s)
    }

    #[test]
    fn commands_execute_in_submission_order() {
        let mut gateway = ScriptedGateway::new(0.1)
            .with_signal("tl_a", "GG", &["l1", "l2"])
            .with_signal("tl_b", "rr", &["l3", "l4"]);
        let queue = CommandQueue::new();

        queue.submit(SimCommand::SwitchSignal {
            signal_id: "tl_a".to_owned(),
        });
        queue.submit(SimCommand::ApplyProgram {
            signal_id: "tl_b".to_owned(),
            phases: vec![phase("GG", 20.0)],
        });

        assert_eq!(queue.pending(), 2);
        assert_eq!(queue.drain_and_execute(&mut gateway), 2);
        assert_eq!(queue.pending(), 0);

        assert_eq!(
            gateway.calls(),
            &[
                GatewayCall::Set {
                    kind: EntityKind::Signal,
                    id: "tl_a".to_owned(),
                    field: Field::PhaseDuration,
                    value: FieldValue::Float(0.0),
                },
                GatewayCall::Set {
                    kind: EntityKind::Signal,
                    id: "tl_b".to_owned(),
                    field: Field::Program,
                    value: FieldValue::Phases(vec![phase("GG", 20.0)]),
                },
            ]
        );
    }

    #[test]
    fn failing_command_does_not_block_later_ones() {
        let mut gateway = ScriptedGateway::new(0.1).with_signal("tl_real", "G", &["l1"]);
        let queue = CommandQueue::new();

        queue.submit(SimCommand::SwitchSignal {
            signal_id: "tl_ghost".to_owned(),
        });
        queue.submit(SimCommand::SwitchSignal {
            signal_id: "tl_real".to_owned(),
        });

        assert_eq!(queue.drain_and_execute(&mut gateway), 1);
        assert_eq!(
            gateway.calls(),
            &[GatewayCall::Set {
                kind: EntityKind::Signal,
                id: "tl_real".to_owned(),
                field: Field::PhaseDuration,
                value: FieldValue::Float(0.0),
            }]
        );
    }

    #[test]
    fn shrinking_program_resets_phase_index_first() {
        let mut gateway = ScriptedGateway::new(0.1)
            .with_signal("tl", "Gr", &["l1", "l2"])
            .with_signal_program(
                "tl",
                vec![phase("Gr", 10.0), phase("yr", 3.0), phase("rG", 10.0)],
            );
        let queue = CommandQueue::new();

        queue.submit(SimCommand::ApplyProgram {
            signal_id: "tl".to_owned(),
            phases: vec![phase("GG", 15.0)],
        });
        queue.drain_and_execute(&mut gateway);

        assert_eq!(
            gateway.calls(),
            &[
                GatewayCall::Set {
                    kind: EntityKind::Signal,
                    id: "tl".to_owned(),
                    field: Field::PhaseIndex,
                    value: FieldValue::Int(0),
                },
                GatewayCall::Set {
                    kind: EntityKind::Signal,
                    id: "tl".to_owned(),
                    field: Field::Program,
                    value: FieldValue::Phases(vec![phase("GG", 15.0)]),
                },
            ]
        );
    }

    #[test]
    fn growing_program_keeps_phase_index() {
        let mut gateway = ScriptedGateway::new(0.1)
            .with_signal("tl", "G", &["l1"])
            .with_signal_program("tl", vec![phase("G", 10.0)]);
        let queue = CommandQueue::new();

        queue.submit(SimCommand::ApplyProgram {
            signal_id: "tl".to_owned(),
            phases: vec![phase("G", 10.0), phase("y", 3.0)],
        });
        queue.drain_and_execute(&mut gateway);

        assert!(gateway.calls().iter().all(|call| {
            !matches!(
                call,
                GatewayCall::Set {
                    field: Field::PhaseIndex,
                    ..
                }
            )
        }));
    }

    #[test]
    fn injections_get_sequential_ids_and_overrides() {
        let mut gateway = ScriptedGateway::new(0.1).with_route("r_loop");
        let queue = CommandQueue::new();
        let request = InjectionRequest {
            route_id: "r_loop".to_owned(),
            type_id: "car".to_owned(),
            color: Some(Rgb::new(0, 128, 255)),
            length_m: Some(7.5),
            max_speed: None,
        };

        queue.submit(SimCommand::InjectVehicle {
            request: request.clone(),
        });
        queue.submit(SimCommand::InjectVehicle {
            request: InjectionRequest {
                color: None,
                length_m: None,
                ..request
            },
        });
        assert_eq!(queue.drain_and_execute(&mut gateway), 2);

        let first = gateway.vehicle("manual_0").unwrap();
        assert_eq!(first.color, Rgb::new(0, 128, 255));
        assert!((first.length - 7.5).abs() < f64::EPSILON);
        assert!(gateway.vehicle("manual_1").is_some());
    }

    #[test]
    #[allow(clippy::panic)]
    fn submit_survives_a_poisoned_lock() {
        let mut gateway = ScriptedGateway::new(0.1).with_signal("tl", "G", &["l1"]);
        let queue = std::sync::Arc::new(CommandQueue::new());

        // Poison the queue lock by panicking while holding it.
        let poisoner = std::sync::Arc::clone(&queue);
        let result = std::thread::spawn(move || {
            let _guard = poisoner.items.lock().unwrap();
            panic!("poisoning the queue");
        })
        .join();
        assert!(result.is_err());

        queue.submit(SimCommand::SwitchSignal {
            signal_id: "tl".to_owned(),
        });
        assert_eq!(queue.pending(), 1);
        assert_eq!(queue.drain_and_execute(&mut gateway), 1);
        assert_eq!(queue.pending(), 0);
    }

    #[test]
    fn concurrent_submitters_lose_nothing_across_interleaved_drains() {
        let mut gateway = ScriptedGateway::new(0.1).with_signal("tl", "G", &["l1"]);
        let queue = std::sync::Arc::new(CommandQueue::new());

        let submitters: Vec<_> = (0..4)
            .map(|_| {
                let queue = std::sync::Arc::clone(&queue);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        queue.submit(SimCommand::SwitchSignal {
                            signal_id: "tl".to_owned(),
                        });
                    }
                })
            })
            .collect();

        // Drain while the submitters are still running, as the loop would.
        let mut executed = 0_usize;
        while executed < 200 {
            executed = executed.saturating_add(queue.drain_and_execute(&mut gateway));
        }
        for submitter in submitters {
            submitter.join().unwrap();
        }

        assert_eq!(executed, 200);
        assert_eq!(queue.pending(), 0);
        assert_eq!(gateway.calls().len(), 200);
    }

    #[test]
    fn program_validation_covers_every_rule() {
        assert!(validate_program("tl", &[], 2).is_err());
        assert!(matches!(
            validate_program("tl", &[phase("", 10.0)], 2),
            Err(CommandError::EmptyPhaseState { index: 0, .. })
        ));
        assert!(matches!(
            validate_program("tl", &[phase("GGG", 10.0)], 2),
            Err(CommandError::WrongStateLength {
                expected: 2,
                actual: 3,
                ..
            })
        ));
        assert!(matches!(
            validate_program("tl", &[phase("GG", 0.0)], 2),
            Err(CommandError::InvalidDuration { .. })
        ));
        assert!(matches!(
            validate_program("tl", &[phase("GG", f64::NAN)], 2),
            Err(CommandError::InvalidDuration { .. })
        ));
        assert!(validate_program("tl", &[phase("Gr", 12.0), phase("yr", 3.0)], 2).is_ok());
    }
}
