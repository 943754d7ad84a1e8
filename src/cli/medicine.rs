//! CLI commands that change or show medicines.

use anyhow::Result;
use chrono::NaiveTime;

use super::App;
use medrem::config::MedremConfig;
use medrem::medicine::types::{Medicine, MedicineEdit, NewMedicine};
use medrem::reminder::time_math::format_12h;

pub async fn add(
    config: &MedremConfig,
    user: &str,
    name: String,
    dosage: String,
    times: Vec<NaiveTime>,
    notes: Option<String>,
) -> Result<()> {
    let app = App::open(config)?;
    let added = app
        .service
        .add_medicine(NewMedicine {
            user_id: user.to_string(),
            name,
            dosage,
            times,
            notes,
        })
        .await?;

    println!("Added #{}: {} ({})", added.medicine.id, added.medicine.name, added.medicine.dosage);
    for entry in &added.schedules {
        println!(
            "  Reminder at {}, first check in {}",
            format_12h(entry.key.target_time()),
            format_delay(entry.initial_delay.as_secs())
        );
    }
    Ok(())
}

pub async fn list(
    config: &MedremConfig,
    user: &str,
    pending: bool,
    at: Option<NaiveTime>,
    json: bool,
) -> Result<()> {
    let app = App::open(config)?;
    let medicines = match at {
        Some(time) => {
            let mut at_time = app.service.at_time(user, time).await?;
            if pending {
                at_time.retain(|m| !m.is_taken);
            }
            at_time
        }
        None => app.service.list(user, pending).await?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&medicines)?);
        return Ok(());
    }

    if medicines.is_empty() {
        println!("No medicines for {user}.");
        return Ok(());
    }
    for medicine in &medicines {
        print_medicine(medicine);
    }
    Ok(())
}

pub async fn set_status(config: &MedremConfig, id: i64, taken: bool) -> Result<()> {
    let app = App::open(config)?;
    match app.service.set_status(id, taken).await? {
        Some(medicine) => {
            let status = if taken { "taken" } else { "missed" };
            println!("Marked #{} {} as {status}.", medicine.id, medicine.name);
        }
        None => println!("No medicine with id {id}."),
    }
    Ok(())
}

pub async fn edit(config: &MedremConfig, id: i64, edit: MedicineEdit) -> Result<()> {
    if edit.is_empty() {
        println!("Nothing to change; pass --name, --dosage, --time or --notes.");
        return Ok(());
    }
    let app = App::open(config)?;
    match app.service.update_medicine(id, edit).await? {
        Some(edited) => {
            print_medicine(&edited.medicine);
            for entry in &edited.rescheduled {
                println!(
                    "  Reminder at {}, next check in {}",
                    format_12h(entry.key.target_time()),
                    format_delay(entry.initial_delay.as_secs())
                );
            }
        }
        None => println!("No medicine with id {id}."),
    }
    Ok(())
}

pub async fn delete(config: &MedremConfig, id: i64) -> Result<()> {
    let app = App::open(config)?;
    match app.service.delete_medicine(id).await? {
        Some(deleted) => {
            println!("Deleted #{}: {}", deleted.medicine.id, deleted.medicine.name);
            println!(
                "  Reminders cancelled: {}, re-registered: {}",
                deleted.cancelled,
                deleted.rescheduled.len()
            );
        }
        None => println!("No medicine with id {id}."),
    }
    Ok(())
}

fn print_medicine(medicine: &Medicine) {
    let times: Vec<String> = medicine.times.iter().map(|t| format_12h(*t)).collect();
    let status = if medicine.is_taken { "taken" } else { "pending" };
    println!(
        "#{:<4} {} ({}) at {} [{status}]",
        medicine.id,
        medicine.name,
        medicine.dosage,
        times.join(", ")
    );
    if let Some(last) = medicine.last_taken {
        println!("      last taken {}", last.format("%Y-%m-%d %H:%M UTC"));
    }
    if let Some(notes) = &medicine.notes {
        println!("      {notes}");
    }
}

pub(crate) fn format_delay(secs: u64) -> String {
    let (hours, minutes) = (secs / 3600, (secs % 3600) / 60);
    match (hours, minutes) {
        (0, 0) => "under a minute".to_string(),
        (0, m) => format!("{m}m"),
        (h, m) => format!("{h}h {m}m"),
    }
}
