use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, Table};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
    Yaml,
}

/// Render a response in the chosen format; `table` builds the table view.
pub fn render(
    format: OutputFormat,
    value: &Value,
    table: fn(&Value) -> Table,
) -> anyhow::Result<String> {
    Ok(match format {
        OutputFormat::Json => serde_json::to_string_pretty(value)?,
        OutputFormat::Yaml => serde_yaml::to_string(value)?,
        OutputFormat::Table => table(value).to_string(),
    })
}

fn field_table() -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Field", "Value"]);
    table
}

fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

pub fn submission_table(response: &Value) -> Table {
    let mut table = field_table();
    table.add_row(vec!["Task ID".to_string(), text(&response["task_id"])]);
    table.add_row(vec!["Status".to_string(), text(&response["status"])]);
    if response.get("recipient").is_some() {
        table.add_row(vec!["Recipient".to_string(), text(&response["recipient"])]);
    }
    if response.get("recipient_count").is_some() {
        table.add_row(vec!["Recipients".to_string(), text(&response["recipient_count"])]);
    }
    table.add_row(vec!["Subject".to_string(), text(&response["subject"])]);
    table.add_row(vec!["Message".to_string(), text(&response["message"])]);
    table
}

pub fn task_table(task: &Value) -> Table {
    let mut table = field_table();
    table.add_row(vec!["Task ID".to_string(), text(&task["task_id"])]);
    table.add_row(vec!["Status".to_string(), text(&task["status"])]);

    if let Some(progress) = task.get("progress") {
        table.add_row(vec!["Progress".to_string(), progress_summary(progress)]);
    }

    if let Some(result) = task.get("result") {
        if let Some(summary) = result.get("summary") {
            table.add_row(vec!["Subject".to_string(), text(&result["subject"])]);
            table.add_row(vec!["Total".to_string(), text(&summary["total_emails"])]);
            table.add_row(vec!["Sent".to_string(), text(&summary["sent_count"])]);
            table.add_row(vec!["Failed".to_string(), text(&summary["failed_count"])]);
            table.add_row(vec![
                "Success Rate".to_string(),
                format!("{:.1}%", summary["success_rate"].as_f64().unwrap_or(0.0)),
            ]);
            if let Some(failed) = result["failed_emails"].as_array() {
                for entry in failed {
                    table.add_row(vec![
                        format!("Failed: {}", text(&entry["email"])),
                        text(&entry["reason"]),
                    ]);
                }
            }
        } else {
            table.add_row(vec!["Recipient".to_string(), text(&result["recipient"])]);
            table.add_row(vec!["Subject".to_string(), text(&result["subject"])]);
            table.add_row(vec!["Sent At".to_string(), text(&result["sent_at"])]);
            table.add_row(vec!["Message".to_string(), text(&result["message"])]);
        }
    }

    if let Some(error) = task.get("error") {
        table.add_row(vec!["Error".to_string(), text(error)]);
    }
    table
}

pub fn queue_table(status: &Value) -> Table {
    let mut table = field_table();
    table.add_row(vec!["Queue Length".to_string(), text(&status["queue_length"])]);
    table.add_row(vec!["Status".to_string(), text(&status["status"])]);
    table.add_row(vec!["Message".to_string(), text(&status["message"])]);
    table
}

/// "3/5 (60%) Connecting to email server"
pub fn progress_summary(progress: &Value) -> String {
    format!(
        "{}/{} ({}%) {}",
        text(&progress["current"]),
        text(&progress["total"]),
        text(&progress["percent"]),
        text(&progress["message"])
    )
}

/// One line per poll while watching a task
pub fn watch_line(task: &Value) -> String {
    match task.get("progress") {
        Some(progress) => format!("[{}] {}", text(&task["status"]), progress_summary(progress)),
        None => format!("[{}]", text(&task["status"])),
    }
}
