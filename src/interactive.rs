use anyhow::Result;
use aws_sdk_ec2::Client as Ec2Client;
use inquire::{InquireError, Select, Text};

use crate::config::PollSettings;
use crate::ec2::{self, Action, InstanceRecord};
use crate::select::{parse_selection, SelectionPolicy};

const MENU_LIST: &str = "List instances";
const MENU_START: &str = "Start instances";
const MENU_STOP: &str = "Stop instances";
const MENU_EXIT: &str = "Exit";

/// Everything one interactive session needs: the single EC2 client built at
/// startup plus the user-chosen knobs.
pub struct Session<'a> {
    pub client: &'a Ec2Client,
    pub settings: PollSettings,
    pub policy: SelectionPolicy,
    pub wait: bool,
}

impl Session<'_> {
    /// Menu loop: fetch → display → select → act, until the user exits.
    /// Action errors are printed and the loop returns to the prompt.
    pub async fn run_menu(&self) -> Result<()> {
        loop {
            let choice = match Select::new(
                "What would you like to do?",
                vec![MENU_LIST, MENU_START, MENU_STOP, MENU_EXIT],
            )
            .prompt()
            {
                Ok(choice) => choice,
                Err(InquireError::OperationCanceled | InquireError::OperationInterrupted) => break,
                Err(e) => return Err(e.into()),
            };

            let result = match choice {
                MENU_LIST => self.list().await,
                MENU_START => self.pick_and_apply(Action::Start).await,
                MENU_STOP => self.pick_and_apply(Action::Stop).await,
                _ => break,
            };

            if let Err(e) = result {
                eprintln!("Error: {:#}", e);
            }
        }

        println!("Goodbye.");
        Ok(())
    }

    /// One-shot variant: single fetch and prompt, then exit.
    pub async fn run_once(&self) -> Result<()> {
        let inventory = ec2::fetch_instances(self.client).await?;
        if inventory.is_empty() {
            println!("No EC2 instances found.");
            return Ok(());
        }

        println!("\nList of EC2 Instances:");
        print_table(&inventory);

        let choice = match Select::new(
            "What would you like to do?",
            vec!["start", "stop", "stop all"],
        )
        .prompt()
        {
            Ok(choice) => choice,
            Err(InquireError::OperationCanceled | InquireError::OperationInterrupted) => {
                return Ok(())
            }
            Err(e) => return Err(e.into()),
        };

        match choice {
            "start" => {
                let candidates = eligible(inventory, Action::Start);
                self.select_and_apply(Action::Start, candidates).await
            }
            "stop" => {
                let candidates = eligible(inventory, Action::Stop);
                self.select_and_apply(Action::Stop, candidates).await
            }
            _ => {
                // "stop all": every running instance, no index prompt.
                let candidates = eligible(inventory, Action::Stop);
                if candidates.is_empty() {
                    println!("No running instances found to stop.");
                    return Ok(());
                }
                println!("\nStopping all running instances:");
                for record in &candidates {
                    println!("- Name: {}, State: {}", record.name, record.state.as_str());
                }
                ec2::apply_action(self.client, Action::Stop, &candidates, self.settings, self.wait)
                    .await?;
                Ok(())
            }
        }
    }

    async fn list(&self) -> Result<()> {
        let records = ec2::fetch_instances(self.client).await?;
        if records.is_empty() {
            println!("No EC2 instances found.");
            return Ok(());
        }
        println!("\nList of EC2 Instances:");
        print_table(&records);
        Ok(())
    }

    async fn pick_and_apply(&self, action: Action) -> Result<()> {
        let inventory = ec2::fetch_instances(self.client).await?;
        let candidates = eligible(inventory, action);
        self.select_and_apply(action, candidates).await
    }

    async fn select_and_apply(
        &self,
        action: Action,
        candidates: Vec<InstanceRecord>,
    ) -> Result<()> {
        if candidates.is_empty() {
            println!(
                "No {} instances available to {}.",
                action.eligible_state().as_str(),
                action.verb()
            );
            return Ok(());
        }

        println!(
            "\nThe following instances are available to {}:",
            action.verb()
        );
        print_table(&candidates);

        let input = match Text::new("Enter instance numbers (e.g. 1,3,5) or 'all':").prompt() {
            Ok(input) => input,
            Err(InquireError::OperationCanceled | InquireError::OperationInterrupted) => {
                return Ok(())
            }
            Err(e) => return Err(e.into()),
        };

        let indices = parse_selection(&input, candidates.len(), self.policy)?;
        if indices.is_empty() {
            println!("No instances selected.");
            return Ok(());
        }

        let chosen: Vec<InstanceRecord> =
            indices.iter().map(|&i| candidates[i].clone()).collect();
        println!("\nYou selected the following instances to {}:", action.verb());
        for record in &chosen {
            println!("- Name: {}, State: {}", record.name, record.state.as_str());
        }

        ec2::apply_action(self.client, action, &chosen, self.settings, self.wait).await?;
        Ok(())
    }
}

fn eligible(inventory: Vec<InstanceRecord>, action: Action) -> Vec<InstanceRecord> {
    let state = action.eligible_state();
    inventory
        .into_iter()
        .filter(|record| record.state == state)
        .collect()
}

/// Enumerated fixed-width listing; row numbers are what the selection
/// expression refers to.
pub fn print_table(records: &[InstanceRecord]) {
    println!(
        "{:<4} {:<24} {:<14} {:<16} {:<16}",
        "#", "NAME", "STATE", "PUBLIC IP", "PRIVATE IP"
    );
    println!("{}", "-".repeat(76));
    for (idx, record) in records.iter().enumerate() {
        println!(
            "{:<4} {:<24} {:<14} {:<16} {:<16}",
            idx + 1,
            record.name,
            record.state.as_str(),
            record.public_ip.as_deref().unwrap_or("-"),
            record.private_ip.as_deref().unwrap_or("-")
        );
    }
}
