//! Decision request delivery over SES

use crate::aws::error::AwsError;
use aws_sdk_sesv2::Client as SesClient;
use aws_sdk_sesv2::types::{Body, Content, Destination, EmailContent, Message};
use tracing::info;

/// One decision request addressed to a role owner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecisionRequest {
    pub to: String,
    pub from: String,
    pub subject: String,
    pub html: String,
}

#[allow(async_fn_in_trait)] // Internal use only, Send+Sync bounds on trait are sufficient
#[cfg_attr(test, mockall::automock)]
pub trait Notifier: Send + Sync {
    async fn send(&self, request: &DecisionRequest) -> Result<(), AwsError>;
}

pub struct SesNotifier {
    ses: SesClient,
}

impl SesNotifier {
    pub fn new(ses: SesClient) -> Self {
        Self { ses }
    }
}

fn content(data: &str) -> Result<Content, AwsError> {
    Content::builder()
        .data(data)
        .charset("UTF-8")
        .build()
        .map_err(|e| AwsError::Validation(format!("Failed to build email content: {e}")))
}

impl Notifier for SesNotifier {
    async fn send(&self, request: &DecisionRequest) -> Result<(), AwsError> {
        let body = Body::builder().html(content(&request.html)?).build();
        let message = Message::builder()
            .subject(content(&request.subject)?)
            .body(body)
            .build();

        self.ses
            .send_email()
            .from_email_address(&request.from)
            .reply_to_addresses(&request.from)
            .destination(Destination::builder().to_addresses(&request.to).build())
            .content(EmailContent::builder().simple(message).build())
            .send()
            .await?;

        info!(to = %request.to, "Decision request sent");
        Ok(())
    }
}
