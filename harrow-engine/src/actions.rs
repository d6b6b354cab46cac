// Executes a node's action list against one element.

use crate::config::{ActionSpec, CountSpec};
use crate::error::{EngineError, Result};
use crate::interpreter::Session;
use crate::provider::ElementHandle;
use crate::value::{as_number, stringify};
use colored::Colorize;
use std::time::Duration;
use tracing::{debug, warn};

impl Session {
    /// Run actions in order. Screenshot paths and the bounding rectangle
    /// are captured before the repetition loop in case the action makes
    /// the element stale.
    pub(crate) async fn run_actions(
        &mut self,
        actions: &[ActionSpec],
        element: &dyn ElementHandle,
    ) -> Result<()> {
        for action in actions {
            let screenshot_path = match &action.screenshot {
                Some(template) => {
                    let evaluated = self.evaluate(template, element).await?.into_value();
                    Some(stringify(&evaluated))
                }
                None => None,
            };

            let count = self.action_count(action, element).await?;
            let rect = element.bounding_box().await?;

            debug!(kind = %action.kind, count, "running action");

            for _ in 0..count {
                if let Some(delay) = action.delay {
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }

                if !element.is_visible().await? {
                    warn!(kind = %action.kind, "element not visible, action may fail");
                    if self.logging {
                        println!(
                            "{} {}",
                            "Action may fail due to node being inaccessible or not visible:"
                                .yellow(),
                            format!(
                                "{}@{}",
                                stringify(self.vars.get("_node").unwrap_or(&serde_json::Value::Null)),
                                action.kind
                            )
                            .white()
                        );
                    }
                }

                let kind = action.kind.as_str();
                let swipes = matches!(kind, "swipe_left" | "swipe_right");

                if action.dispatch && !swipes {
                    element.dispatch_event(kind).await?;
                } else if kind == "click" {
                    element.click(&action.options).await?;
                } else if swipes {
                    let (center_x, center_y) = rect.center();
                    let end_x = if kind == "swipe_left" {
                        0.0
                    } else {
                        rect.x + rect.width
                    };

                    self.page.mouse_move(center_x, center_y).await?;
                    self.page.mouse_down().await?;
                    self.page.mouse_move(end_x, center_y).await?;
                    self.page.mouse_up().await?;
                } else {
                    return Err(EngineError::Config(format!(
                        "the {} action is currently not supported",
                        kind
                    )));
                }

                if let Some(wait) = action.wait {
                    tokio::time::sleep(Duration::from_millis(wait)).await;
                }
            }

            if let Some(path) = screenshot_path {
                self.page.screenshot(&path, true).await?;
            }
        }

        Ok(())
    }

    /// Repetitions for one action: a literal, a template, or an attribute
    /// query, numerically coerced. Anything non-numeric is fatal.
    async fn action_count(
        &mut self,
        action: &ActionSpec,
        element: &dyn ElementHandle,
    ) -> Result<u64> {
        let count = match &action.count {
            None => return Ok(1),
            Some(CountSpec::Fixed(n)) => return Ok(*n),
            Some(CountSpec::Template(template)) => {
                self.evaluate(template, element).await?.into_value()
            }
            Some(CountSpec::Query(query)) => {
                let accessor = query.to_accessor()?;
                self.attribute(&accessor, element).await?.into_value()
            }
        };

        as_number(&count)
            .filter(|n| *n >= 0.0)
            .map(|n| n as u64)
            .ok_or_else(|| {
                EngineError::Config(format!(
                    "action count for {} does not resolve to a number: {}",
                    action.kind,
                    stringify(&count)
                ))
            })
    }
}
