mod client;
mod output;

use clap::{Parser, Subcommand};
use client::ApiClient;
use output::{queue_table, render, submission_table, task_table, watch_line, OutputFormat};
use std::time::Duration;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "mq-admin")]
#[command(about = "Mail Queue Admin CLI", long_about = None)]
struct Args {
    /// REST API address
    #[arg(long, env = "MQ_API", default_value = "http://127.0.0.1:8000")]
    api: String,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Send one email in the background
    Send {
        /// Recipient address
        recipient: String,

        #[arg(short, long)]
        subject: String,

        /// Message body
        #[arg(short, long)]
        message: String,
    },

    /// Send one message to many recipients
    Bulk {
        /// Recipient addresses
        recipients: Vec<String>,

        /// File with one address per line, appended to the list
        #[arg(long)]
        file: Option<String>,

        #[arg(short, long)]
        subject: String,

        /// Message body
        #[arg(short, long)]
        message: String,
    },

    /// Get task status
    Status {
        /// Task ID
        task_id: String,
    },

    /// Poll a task until it completes or fails
    Watch {
        /// Task ID
        task_id: String,

        /// Poll interval in milliseconds
        #[arg(long, default_value = "1000")]
        interval_ms: u64,
    },

    /// Show queue depth
    Queue,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let client = ApiClient::new(&args.api);

    match args.command {
        Commands::Send {
            recipient,
            subject,
            message,
        } => {
            let response = client.send_email(&recipient, &subject, &message).await?;
            println!("{}", render(args.format, &response, submission_table)?);
        }

        Commands::Bulk {
            mut recipients,
            file,
            subject,
            message,
        } => {
            if let Some(path) = file {
                let contents = std::fs::read_to_string(&path)?;
                recipients.extend(
                    contents
                        .lines()
                        .map(str::trim)
                        .filter(|line| !line.is_empty())
                        .map(String::from),
                );
            }

            let response = client.send_bulk(&recipients, &subject, &message).await?;
            println!("{}", render(args.format, &response, submission_table)?);
        }

        Commands::Status { task_id } => {
            let task_id = Uuid::parse_str(&task_id)?;
            let task = client.task_status(&task_id).await?;
            println!("{}", render(args.format, &task, task_table)?);
        }

        Commands::Watch {
            task_id,
            interval_ms,
        } => {
            let task_id = Uuid::parse_str(&task_id)?;
            let mut last_line = String::new();

            let task = loop {
                let task = client.task_status(&task_id).await?;
                let status = task["status"].as_str().unwrap_or("");
                if status == "COMPLETED" || status == "FAILED" {
                    break task;
                }

                let line = watch_line(&task);
                if line != last_line {
                    eprintln!("{}", line);
                    last_line = line;
                }
                tokio::time::sleep(Duration::from_millis(interval_ms)).await;
            };

            println!("{}", render(args.format, &task, task_table)?);
        }

        Commands::Queue => {
            let status = client.queue_status().await?;
            println!("{}", render(args.format, &status, queue_table)?);
        }
    }

    Ok(())
}
