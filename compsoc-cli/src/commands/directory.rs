use crate::cli::DirectoryCommands;
use crate::error::Result;
use colored::Colorize;
use compsoc_config::BridgeConfig;
use compsoc_directory::{DirectoryEntry, EntityType};
use serde_json::json;

pub async fn handle_directory_command(
    command: DirectoryCommands,
    config: &BridgeConfig,
    json_output: bool,
) -> Result<()> {
    let client = compsoc_identity::directory_client(config);

    match command {
        DirectoryCommands::Lookup { uid, society } => {
            let entity_type = if society {
                EntityType::Society
            } else {
                EntityType::Person
            };
            let entry = client.lookup(&uid, entity_type).await?;

            if json_output {
                println!("{}", serde_json::to_string_pretty(&json!({ "entry": entry }))?);
                return Ok(());
            }
            match entry {
                Some(DirectoryEntry::User(user)) => {
                    println!("{} {}", "✓".green(), user.display_name.bright_cyan());
                    println!("  uid:       {}", user.uid);
                    println!("  mail:      {}", user.mail.join(", "));
                    if let Some(number) = user.uid_number {
                        println!("  uidNumber: {number}");
                    }
                    if let Some(member_id) = &user.member_id {
                        println!("  member id: {member_id}");
                    }
                }
                Some(DirectoryEntry::Society(society)) => {
                    println!("{} {}", "✓".green(), society.display_name.bright_cyan());
                    println!("  uid:  {}", society.uid);
                    println!("  mail: {}", society.mail.join(", "));
                }
                None => println!("{} No {:?} entry for {uid}", "!".yellow(), entity_type),
            }
        }

        DirectoryCommands::Privileges { uid } => {
            let privileges = client.privileges(&uid).await?;
            if json_output {
                let output = json!({ "uid": uid, "privileges": privileges });
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                println!("{}", uid.bright_cyan());
                println!("  admin:     {}", privileges.is_admin);
                println!("  committee: {}", privileges.is_committee);
            }
        }

        DirectoryCommands::Groups => {
            let groups = client.groups().await?;
            if json_output {
                println!("{}", serde_json::to_string_pretty(&groups)?);
            } else if groups.is_empty() {
                println!("No groups found");
            } else {
                for group in &groups {
                    println!("{}", group.name.bright_cyan());
                    for member in group.member_ids() {
                        println!("  {member}");
                    }
                }
            }
        }

        DirectoryCommands::NextId => {
            let next = client.next_numeric_id().await?;
            if json_output {
                println!("{}", serde_json::to_string_pretty(&json!({ "next_uid_number": next }))?);
            } else {
                println!("{next}");
            }
        }
    }

    Ok(())
}
