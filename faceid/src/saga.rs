//! Ordered multi-store steps with compensations.

use tracing::{debug, warn};

use crate::error::FaceIdError;

type Action<'a, C> = Box<dyn FnOnce(&mut C) -> Result<(), FaceIdError> + 'a>;

struct Step<'a, C> {
    name: &'static str,
    action: Action<'a, C>,
    compensate: Option<Action<'a, C>>,
}

/// A sequence of steps sharing a context `C`.
///
/// Steps run in order. When one fails, the compensations of the steps that
/// already completed run in reverse order and the original error is
/// returned. A failing compensation is logged and does not replace it.
pub struct Saga<'a, C> {
    name: &'static str,
    steps: Vec<Step<'a, C>>,
}

impl<'a, C> Saga<'a, C> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            steps: Vec::new(),
        }
    }

    /// Add a step that is left in place if a later step fails.
    pub fn step(
        mut self,
        name: &'static str,
        action: impl FnOnce(&mut C) -> Result<(), FaceIdError> + 'a,
    ) -> Self {
        self.steps.push(Step {
            name,
            action: Box::new(action),
            compensate: None,
        });
        self
    }

    /// Add a step that is undone by `compensate` if a later step fails.
    pub fn compensated(
        mut self,
        name: &'static str,
        action: impl FnOnce(&mut C) -> Result<(), FaceIdError> + 'a,
        compensate: impl FnOnce(&mut C) -> Result<(), FaceIdError> + 'a,
    ) -> Self {
        self.steps.push(Step {
            name,
            action: Box::new(action),
            compensate: Some(Box::new(compensate)),
        });
        self
    }

    pub fn run(self, ctx: &mut C) -> Result<(), FaceIdError> {
        let saga = self.name;
        let mut done: Vec<(&'static str, Action<'a, C>)> = Vec::new();

        for step in self.steps {
            debug!(saga, step = step.name, "faceid: saga step");
            match (step.action)(ctx) {
                Ok(()) => {
                    if let Some(c) = step.compensate {
                        done.push((step.name, c));
                    }
                }
                Err(err) => {
                    warn!(saga, step = step.name, error = %err, "faceid: saga step failed, compensating");
                    for (name, compensate) in done.into_iter().rev() {
                        if let Err(e) = compensate(ctx) {
                            warn!(saga, step = name, error = %e, "faceid: compensation failed");
                        }
                    }
                    return Err(err);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_steps_run_in_order() {
        let mut log: Vec<&'static str> = Vec::new();
        Saga::new("test")
            .step("a", |l: &mut Vec<&'static str>| {
                l.push("a");
                Ok(())
            })
            .compensated(
                "b",
                |l| {
                    l.push("b");
                    Ok(())
                },
                |l| {
                    l.push("undo b");
                    Ok(())
                },
            )
            .run(&mut log)
            .unwrap();
        assert_eq!(log, vec!["a", "b"]);
    }

    #[test]
    fn failure_compensates_in_reverse() {
        let mut log: Vec<&'static str> = Vec::new();
        let err = Saga::new("test")
            .compensated(
                "a",
                |l: &mut Vec<&'static str>| {
                    l.push("a");
                    Ok(())
                },
                |l| {
                    l.push("undo a");
                    Ok(())
                },
            )
            .step("b", |l| {
                l.push("b");
                Ok(())
            })
            .compensated(
                "c",
                |l| {
                    l.push("c");
                    Ok(())
                },
                |l| {
                    l.push("undo c");
                    Err(FaceIdError::Persistence("undo failed".into()))
                },
            )
            .step("d", |_| Err(FaceIdError::ZeroNormVector))
            .compensated(
                "e",
                |l| {
                    l.push("e");
                    Ok(())
                },
                |l| {
                    l.push("undo e");
                    Ok(())
                },
            )
            .run(&mut log)
            .unwrap_err();

        assert!(matches!(err, FaceIdError::ZeroNormVector));
        assert_eq!(log, vec!["a", "b", "c", "undo c", "undo a"]);
    }
}
