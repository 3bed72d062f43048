mod config;
mod error;
mod event;
mod identity;
mod notify;
mod router;
mod scan;
mod storage;

#[cfg(test)]
mod testing;

use std::env;
use std::process::ExitCode;

use aws_sdk_sqs::Client;
use tracing_subscriber::filter;

use config::Config;
use error::NotifierError;
use event::{EventBatch, Notification};
use notify::{DryRunPublisher, Publisher, SnsPublisher};
use router::Router;
use scan::{scanner_from_config, VirusScanner};
use storage::{ObjectStore, S3Store};


struct EventMessage {
    pub batch: Option<EventBatch>,
    pub receipt_handle: String,
}


#[tokio::main]
async fn main() -> ExitCode {

    tracing_subscriber::fmt()
        .with_file(true)
        .with_line_number(true)
        .with_level(true)
        .with_max_level(filter::LevelFilter::INFO)
        .init();

    let mut config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!("{}", err);
            return ExitCode::FAILURE;
        }
    };

    let sdk_config = aws_config::from_env()
        .region(aws_config::Region::new(config.region.clone()))
        .load()
        .await;

    let store = S3Store::from_sdk_config(&sdk_config, &config);
    let scanner = scanner_from_config(&config);

    let event_files: Vec<String> = env::args().skip(1).collect();
    if !event_files.is_empty() {
        run_local(&config, &store, scanner.as_deref(), &event_files).await;
        return ExitCode::SUCCESS;
    }

    match identity::resolve_account_id(&sdk_config).await {
        Ok(account_id) => config.account_id = Some(account_id),
        Err(err) => {
            tracing::error!("{}", err);
            return ExitCode::FAILURE;
        }
    }

    let queue_url = match config.event_queue_url.clone() {
        Some(queue_url) => queue_url,
        None => {
            tracing::error!("EVENT_QUEUE_URL not set and no event files given");
            return ExitCode::FAILURE;
        }
    };

    let publisher = SnsPublisher::new(aws_sdk_sns::Client::new(&sdk_config), config.clone());
    let client = aws_sdk_sqs::Client::new(&sdk_config);

    let router = Router::new(&config, &store, &publisher, scanner.as_deref());
    run_queue(&router, &client, &queue_url).await;

    ExitCode::SUCCESS
}

/// Route each event file as one batch, print what would have been published instead of publishing it.
async fn run_local(config: &Config, store: &dyn ObjectStore, scanner: Option<&dyn VirusScanner>, event_files: &[String]) {
    let publisher = DryRunPublisher;
    let router = Router::new(config, store, &publisher as &dyn Publisher, scanner);

    for path in event_files {
        let batch = match read_event_file(path).await {
            Ok(batch) => batch,
            Err(err) => {
                tracing::error!("Skipping {}: {}", path, err);
                continue;
            }
        };

        let results = router.route(&batch).await;
        let messages: Vec<serde_json::Value> = results.iter().map(Notification::to_message).collect();
        println!("{}", serde_json::Value::Array(messages));
    }
}

async fn read_event_file(path: &str) -> Result<EventBatch, NotifierError> {
    let body = tokio::fs::read_to_string(path).await?;
    EventBatch::from_json(&body)
}

async fn run_queue(router: &Router<'_>, client: &Client, queue_url: &str) {
    loop {
        let event_message_opt = receive_event_message(client, queue_url).await
            .unwrap_or_else(|err| {
                tracing::error!("Error receiving event notification: {}", err);
                None
            });

        if let Some(event_message) = event_message_opt {
            if let Some(batch) = event_message.batch {
                let results = router.route(&batch).await;
                tracing::info!("Batch produced {} notifications", results.len());
            }

            delete_message(client, queue_url, &event_message.receipt_handle).await
                .unwrap_or_else(|err| {
                    tracing::error!("Error deleting message: {}", err);
                });
        }

        // Sleep for a while before checking the queue again
        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
    }
}

async fn receive_event_message(client: &Client, queue_url: &str) -> Result<Option<EventMessage>, NotifierError> {
    let rcv_message_output = client
        .receive_message()
        .queue_url(queue_url)
        .max_number_of_messages(1)
        .send()
        .await
        .map_err(|err| NotifierError::Queue(format!("{}", aws_sdk_sqs::error::DisplayErrorContext(err))))?;

    for message in rcv_message_output.messages.unwrap_or_default() {

        let receipt_handle = message.receipt_handle.unwrap_or_default();

        let body = match message.body {
            Some(body) => body,
            None => {
                tracing::warn!("Received message with no body, skipping.");
                continue;
            }
        };

        // s3:TestEvent and anything else without records is dropped from the queue
        let batch = match EventBatch::from_json(&body) {
            Ok(batch) => Some(batch),
            Err(err) => {
                tracing::warn!("Message body is not an event batch, discarding: {}", err);
                None
            }
        };

        return Ok(Some(EventMessage { batch, receipt_handle }));
    }

    Ok(None)
}

async fn delete_message(client: &Client, queue_url: &str, receipt_handle: &str) -> Result<(), NotifierError> {
    client
        .delete_message()
        .queue_url(queue_url)
        .receipt_handle(receipt_handle)
        .send()
        .await
        .map_err(|err| NotifierError::Queue(format!("{}", aws_sdk_sqs::error::DisplayErrorContext(err))))?;

    tracing::info!("Message deleted successfully");
    Ok(())
}
