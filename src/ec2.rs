use anyhow::{Context, Result};
use aws_sdk_ec2::types::{InstanceStateChange, InstanceStateName, Reservation};
use aws_sdk_ec2::Client as Ec2Client;
use std::collections::HashSet;
use tokio::time::sleep;

use crate::config::PollSettings;

/// Display name used when an instance carries no `Name` tag.
pub const NAME_PLACEHOLDER: &str = "No Name";

/// One EC2 instance as seen at fetch time. The state is only authoritative
/// at the moment of the describe call; nothing here is cached across fetches.
#[derive(Debug, Clone)]
pub struct InstanceRecord {
    pub id: String,
    pub name: String,
    pub state: InstanceStateName,
    pub public_ip: Option<String>,
    pub private_ip: Option<String>,
}

/// The two lifecycle mutations this tool performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Start,
    Stop,
}

impl Action {
    /// State an instance must be in to be offered for this action.
    pub fn eligible_state(self) -> InstanceStateName {
        match self {
            Action::Start => InstanceStateName::Stopped,
            Action::Stop => InstanceStateName::Running,
        }
    }

    /// State the poll loop waits for after the action is issued.
    pub fn target_state(self) -> InstanceStateName {
        match self {
            Action::Start => InstanceStateName::Running,
            Action::Stop => InstanceStateName::Stopped,
        }
    }

    pub fn verb(self) -> &'static str {
        match self {
            Action::Start => "start",
            Action::Stop => "stop",
        }
    }
}

fn record_from_instance(instance: &aws_sdk_ec2::types::Instance) -> Option<InstanceRecord> {
    let id = instance.instance_id()?.to_string();
    let state = instance.state().and_then(|s| s.name()).cloned()?;

    // First `Name` tag wins.
    let name = instance
        .tags()
        .iter()
        .find(|tag| tag.key() == Some("Name"))
        .and_then(|tag| tag.value())
        .unwrap_or(NAME_PLACEHOLDER)
        .to_string();

    Some(InstanceRecord {
        id,
        name,
        state,
        public_ip: instance.public_ip_address().map(str::to_string),
        private_ip: instance.private_ip_address().map(str::to_string),
    })
}

fn records_from_reservations(reservations: &[Reservation]) -> Vec<InstanceRecord> {
    reservations
        .iter()
        .flat_map(|res| res.instances())
        .filter_map(record_from_instance)
        .filter(|record| record.state != InstanceStateName::Terminated)
        .collect()
}

/// Fetch the full inventory, flattened to records. Terminated instances are
/// skipped. An account with zero instances yields an empty vec.
pub async fn fetch_instances(client: &Ec2Client) -> Result<Vec<InstanceRecord>> {
    let resp = client
        .describe_instances()
        .send()
        .await
        .context("DescribeInstances failed")?;

    Ok(records_from_reservations(resp.reservations()))
}

/// Re-describe an exact set of instance ids. Used by the poll loop and the
/// direct start/stop subcommands.
pub async fn fetch_instances_by_ids(
    client: &Ec2Client,
    ids: &[String],
) -> Result<Vec<InstanceRecord>> {
    let resp = client
        .describe_instances()
        .set_instance_ids(Some(ids.to_vec()))
        .send()
        .await
        .context("DescribeInstances failed")?;

    Ok(resp
        .reservations()
        .iter()
        .flat_map(|res| res.instances())
        .filter_map(record_from_instance)
        .collect())
}

/// Result of waiting for a state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Completed,
    NotWaited,
    TimedOut,
    Cancelled,
}

impl WaitOutcome {
    /// Process exit code for scripting callers. A timed-out transition is
    /// a failure; a cancelled wait reports the conventional SIGINT code.
    pub fn exit_code(self) -> i32 {
        match self {
            WaitOutcome::Completed | WaitOutcome::NotWaited => 0,
            WaitOutcome::TimedOut => 1,
            WaitOutcome::Cancelled => 130,
        }
    }
}

/// Ids for the single bulk request, one per selected record, in display
/// order.
fn request_ids(records: &[InstanceRecord]) -> Vec<String> {
    records.iter().map(|r| r.id.clone()).collect()
}

/// Issue a single bulk start or stop call for `records`, report the
/// transitional states the API returns, then optionally poll until every
/// instance reaches the target state.
///
/// The poll loop is only entered if the bulk call succeeds.
pub async fn apply_action(
    client: &Ec2Client,
    action: Action,
    records: &[InstanceRecord],
    settings: PollSettings,
    wait: bool,
) -> Result<WaitOutcome> {
    anyhow::ensure!(!records.is_empty(), "no instances selected");

    let ids = request_ids(records);
    tracing::info!(count = ids.len(), action = action.verb(), "issuing bulk call");
    println!(
        "\nAttempting to {} instances: {}...",
        action.verb(),
        ids.join(", ")
    );

    let changes = match action {
        Action::Start => {
            let resp = client
                .start_instances()
                .set_instance_ids(Some(ids.clone()))
                .send()
                .await
                .context("StartInstances failed")?;
            resp.starting_instances().to_vec()
        }
        Action::Stop => {
            let resp = client
                .stop_instances()
                .set_instance_ids(Some(ids.clone()))
                .send()
                .await
                .context("StopInstances failed")?;
            resp.stopping_instances().to_vec()
        }
    };

    println!("\nState change initiated:");
    report_state_changes(&changes, records);

    if !wait {
        return Ok(WaitOutcome::NotWaited);
    }

    let target = action.target_state();
    println!(
        "\nWaiting for instances to reach '{}' (Ctrl-C to cancel)...",
        target.as_str()
    );
    wait_for_state(client, records, target, settings).await
}

fn report_state_changes(changes: &[InstanceStateChange], records: &[InstanceRecord]) {
    for change in changes {
        let id = change.instance_id().unwrap_or("unknown");
        let state = change
            .current_state()
            .and_then(|s| s.name())
            .map(|n| n.as_str())
            .unwrap_or("unknown");
        let name = records
            .iter()
            .find(|r| r.id == id)
            .map(|r| r.name.as_str())
            .unwrap_or(NAME_PLACEHOLDER);
        println!("- Name: {}, State: {}", name, state);
    }
}

/// Record which of `current` have reached `target` and were not already
/// accounted for. Returns the records that completed this round.
fn newly_reached<'a>(
    current: &'a [InstanceRecord],
    target: &InstanceStateName,
    done: &mut HashSet<String>,
) -> Vec<&'a InstanceRecord> {
    current
        .iter()
        .filter(|record| record.state == *target)
        .filter(|record| done.insert(record.id.clone()))
        .collect()
}

/// Poll the exact id set of `targets` at a fixed interval until every
/// instance reports `target`, the attempt budget runs out, or Ctrl-C.
pub async fn wait_for_state(
    client: &Ec2Client,
    targets: &[InstanceRecord],
    target: InstanceStateName,
    settings: PollSettings,
) -> Result<WaitOutcome> {
    let ids = request_ids(targets);
    let mut done: HashSet<String> = HashSet::new();

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    for attempt in 1..=settings.max_attempts {
        tokio::select! {
            _ = &mut ctrl_c => {
                println!("\nWait cancelled.");
                return Ok(WaitOutcome::Cancelled);
            }
            _ = sleep(settings.interval) => {}
        }

        let current = fetch_instances_by_ids(client, &ids).await?;
        for record in newly_reached(&current, &target, &mut done) {
            println!("- Name: {}, State: {}", record.name, record.state.as_str());
        }

        tracing::debug!(
            attempt,
            reached = done.len(),
            total = ids.len(),
            "poll round complete"
        );

        if done.len() == ids.len() {
            println!("\nAll selected instances are now {}.", target.as_str());
            return Ok(WaitOutcome::Completed);
        }
    }

    println!(
        "\nGave up after {} attempts; {} of {} instances reached '{}'.",
        settings.max_attempts,
        done.len(),
        ids.len(),
        target.as_str()
    );
    Ok(WaitOutcome::TimedOut)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_ec2::types::{Instance, InstanceState, Tag};

    fn tag(key: &str, value: &str) -> Tag {
        Tag::builder().key(key).value(value).build()
    }

    fn instance(id: &str, state: InstanceStateName, tags: Vec<Tag>) -> Instance {
        let mut builder = Instance::builder()
            .instance_id(id)
            .state(InstanceState::builder().name(state).build());
        for t in tags {
            builder = builder.tags(t);
        }
        builder.build()
    }

    fn reservation(instances: Vec<Instance>) -> Reservation {
        let mut builder = Reservation::builder();
        for i in instances {
            builder = builder.instances(i);
        }
        builder.build()
    }

    #[test]
    fn name_tag_resolves_display_name() {
        let inst = instance(
            "i-1",
            InstanceStateName::Running,
            vec![tag("Env", "prod"), tag("Name", "web-1")],
        );
        let record = record_from_instance(&inst).unwrap();
        assert_eq!(record.name, "web-1");
    }

    #[test]
    fn missing_name_tag_falls_back_to_placeholder() {
        let inst = instance("i-1", InstanceStateName::Stopped, vec![tag("Env", "prod")]);
        let record = record_from_instance(&inst).unwrap();
        assert_eq!(record.name, NAME_PLACEHOLDER);
    }

    #[test]
    fn addresses_are_captured_when_present() {
        let inst = Instance::builder()
            .instance_id("i-1")
            .state(
                InstanceState::builder()
                    .name(InstanceStateName::Running)
                    .build(),
            )
            .public_ip_address("203.0.113.7")
            .private_ip_address("10.0.0.7")
            .build();
        let record = record_from_instance(&inst).unwrap();
        assert_eq!(record.public_ip.as_deref(), Some("203.0.113.7"));
        assert_eq!(record.private_ip.as_deref(), Some("10.0.0.7"));
    }

    #[test]
    fn flatten_skips_terminated_instances() {
        let reservations = vec![
            reservation(vec![
                instance("i-1", InstanceStateName::Running, vec![]),
                instance("i-2", InstanceStateName::Terminated, vec![]),
            ]),
            reservation(vec![instance("i-3", InstanceStateName::Stopped, vec![])]),
        ];
        let records = records_from_reservations(&reservations);
        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["i-1", "i-3"]);
    }

    #[test]
    fn zero_reservations_yield_empty_inventory() {
        assert!(records_from_reservations(&[]).is_empty());
    }

    #[test]
    fn action_states_line_up() {
        assert_eq!(Action::Start.eligible_state(), InstanceStateName::Stopped);
        assert_eq!(Action::Start.target_state(), InstanceStateName::Running);
        assert_eq!(Action::Stop.eligible_state(), InstanceStateName::Running);
        assert_eq!(Action::Stop.target_state(), InstanceStateName::Stopped);
    }

    fn record(id: &str, state: InstanceStateName) -> InstanceRecord {
        InstanceRecord {
            id: id.to_string(),
            name: NAME_PLACEHOLDER.to_string(),
            state,
            public_ip: None,
            private_ip: None,
        }
    }

    #[test]
    fn bulk_request_carries_every_selected_id_once() {
        let records = vec![
            record("i-1", InstanceStateName::Stopped),
            record("i-2", InstanceStateName::Stopped),
            record("i-3", InstanceStateName::Stopped),
        ];
        // Three selected records become one id vector for the single call.
        let ids = request_ids(&records);
        assert_eq!(ids, vec!["i-1", "i-2", "i-3"]);
    }

    #[test]
    fn exit_codes_distinguish_incomplete_transitions() {
        assert_eq!(WaitOutcome::Completed.exit_code(), 0);
        assert_eq!(WaitOutcome::NotWaited.exit_code(), 0);
        assert_eq!(WaitOutcome::TimedOut.exit_code(), 1);
        assert_eq!(WaitOutcome::Cancelled.exit_code(), 130);
    }

    #[test]
    fn poll_accumulation_counts_each_instance_once() {
        let target = InstanceStateName::Stopped;
        let mut done = HashSet::new();

        // Round 1: only i-1 has stopped.
        let round1 = vec![
            record("i-1", InstanceStateName::Stopped),
            record("i-2", InstanceStateName::Stopping),
        ];
        let fresh: Vec<&str> = newly_reached(&round1, &target, &mut done)
            .iter()
            .map(|r| r.id.as_str())
            .collect();
        assert_eq!(fresh, vec!["i-1"]);

        // Round 2: both stopped; i-1 must not be reported again.
        let round2 = vec![
            record("i-1", InstanceStateName::Stopped),
            record("i-2", InstanceStateName::Stopped),
        ];
        let fresh: Vec<&str> = newly_reached(&round2, &target, &mut done)
            .iter()
            .map(|r| r.id.as_str())
            .collect();
        assert_eq!(fresh, vec!["i-2"]);

        let mut all: Vec<&str> = done.iter().map(String::as_str).collect();
        all.sort_unstable();
        assert_eq!(all, vec!["i-1", "i-2"]);
    }

    #[test]
    fn poll_accumulation_ignores_non_target_states() {
        let target = InstanceStateName::Running;
        let mut done = HashSet::new();
        let round = vec![record("i-1", InstanceStateName::Pending)];
        assert!(newly_reached(&round, &target, &mut done).is_empty());
        assert!(done.is_empty());
    }
}
