use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use log::{info, warn};
use serde::Serialize;

use crate::directory::{DeviceDirectory, DeviceHandle};
use crate::error::{Error, Result};
use crate::light::color::Color;
use crate::light::state::{Light, LightState};

/// Acknowledgement of a state change. Serializes as `"ok"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Ack {
    Ok,
}

/// Per-label outcomes of one batch, in the order the labels were given.
#[derive(Debug)]
pub struct BatchReport<T> {
    pub outcomes: Vec<(String, Result<T>)>,
}

impl<T> BatchReport<T> {
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|(_, outcome)| outcome.is_ok())
    }

    pub fn succeeded(&self) -> impl Iterator<Item = (&str, &T)> {
        self.outcomes.iter().filter_map(|(label, outcome)| {
            outcome.as_ref().ok().map(|value| (label.as_str(), value))
        })
    }

    pub fn failed(&self) -> impl Iterator<Item = (&str, &Error)> {
        self.outcomes.iter().filter_map(|(label, outcome)| {
            outcome.as_ref().err().map(|error| (label.as_str(), error))
        })
    }

    /// Collapses the report into one result: every value when all labels
    /// succeeded, otherwise the first failure in label order and nothing else.
    pub fn into_all_or_nothing(self) -> Result<BTreeMap<String, T>> {
        self.outcomes
            .into_iter()
            .map(|(label, outcome)| outcome.map(|value| (label, value)))
            .collect()
    }
}

/// Applies one operation to a batch of labels concurrently.
///
/// The plain operations keep the all-or-nothing contract: one failing label
/// fails the whole call and the results of the other labels are dropped.
/// The `*_each` variants return a [`BatchReport`] instead.
pub struct CommandDispatcher {
    directory: Arc<DeviceDirectory>,
}

impl CommandDispatcher {
    pub fn new(directory: Arc<DeviceDirectory>) -> Self {
        CommandDispatcher { directory }
    }

    pub fn directory(&self) -> &DeviceDirectory {
        &self.directory
    }

    pub async fn list_lights(&self) -> Result<Vec<Light>> {
        self.directory.list_all().await
    }

    pub async fn get_states(&self, labels: &[String]) -> Result<BTreeMap<String, LightState>> {
        self.get_states_each(labels).await?.into_all_or_nothing()
    }

    pub async fn get_states_each(&self, labels: &[String]) -> Result<BatchReport<LightState>> {
        self.fan_out("get-state", labels, |handle| async move { handle.get_state().await })
            .await
    }

    pub async fn set_color(
        &self,
        labels: &[String],
        color: Color,
        duration: Duration,
    ) -> Result<BTreeMap<String, Ack>> {
        self.set_color_each(labels, color, duration)
            .await?
            .into_all_or_nothing()
    }

    pub async fn set_color_each(
        &self,
        labels: &[String],
        color: Color,
        duration: Duration,
    ) -> Result<BatchReport<Ack>> {
        color.validate()?;
        self.fan_out("set-color", labels, move |handle| async move {
            handle.set_color(&color, duration).await.map(|_| Ack::Ok)
        })
        .await
    }

    pub async fn turn_on(
        &self,
        labels: &[String],
        color: Option<Color>,
        duration: Duration,
    ) -> Result<BTreeMap<String, Ack>> {
        self.turn_on_each(labels, color, duration)
            .await?
            .into_all_or_nothing()
    }

    pub async fn turn_on_each(
        &self,
        labels: &[String],
        color: Option<Color>,
        duration: Duration,
    ) -> Result<BatchReport<Ack>> {
        if let Some(color) = &color {
            color.validate()?;
        }
        self.fan_out("turn-on", labels, move |handle| async move {
            handle.turn_on(color.as_ref(), duration).await.map(|_| Ack::Ok)
        })
        .await
    }

    pub async fn turn_off(
        &self,
        labels: &[String],
        duration: Duration,
    ) -> Result<BTreeMap<String, Ack>> {
        self.turn_off_each(labels, duration)
            .await?
            .into_all_or_nothing()
    }

    pub async fn turn_off_each(
        &self,
        labels: &[String],
        duration: Duration,
    ) -> Result<BatchReport<Ack>> {
        self.fan_out("turn-off", labels, move |handle| async move {
            handle.turn_off(duration).await.map(|_| Ack::Ok)
        })
        .await
    }

    /// Resolves every label and runs `action` on each handle, all at once.
    /// Waits for every label to settle before returning.
    async fn fan_out<T, F, Fut>(
        &self,
        operation: &str,
        labels: &[String],
        action: F,
    ) -> Result<BatchReport<T>>
    where
        F: Fn(DeviceHandle) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let labels = distinct_labels(labels)?;
        info!("Dispatching {} to {} lights", operation, labels.len());

        let action = &action;
        let directory = &self.directory;
        let outcomes = join_all(labels.iter().map(|label| async move {
            let handle = directory.resolve(label).await?;
            action(handle).await
        }))
        .await;

        let report = BatchReport {
            outcomes: labels.into_iter().zip(outcomes).collect(),
        };
        for (label, error) in report.failed() {
            warn!("{} failed for '{}': {}", operation, label, error);
        }
        Ok(report)
    }
}

/// Rejects empty input and collapses repeated labels, keeping first-seen order.
fn distinct_labels(labels: &[String]) -> Result<Vec<String>> {
    if labels.is_empty() {
        return Err(Error::validation("at least one label is required"));
    }
    let mut seen = HashSet::new();
    let mut distinct = Vec::with_capacity(labels.len());
    for label in labels {
        if label.is_empty() {
            return Err(Error::validation("labels must not be empty strings"));
        }
        if seen.insert(label.as_str()) {
            distinct.push(label.clone());
        }
    }
    Ok(distinct)
}
