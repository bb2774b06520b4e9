//! Owner approval request
//!
//! The driver pauses the workflow on an opaque callback token. This stage
//! mails the finding's owner two links that resume it, one approving the
//! deletion and one denying it. Nothing is stored here; the token travels
//! only inside the links.

use crate::aws::error::AwsError;
use crate::aws::notify::{DecisionRequest, Notifier};
use garde::Validate;
use rolesweep_common::workflow::ApprovalEvent;
use serde::{Deserialize, Serialize};
use tracing::info;

pub const DECISION_SUBJECT: &str = "Please take action on this unused IAM Role";

/// Approve and deny links for one callback token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackLinks {
    pub approve: String,
    pub deny: String,
}

/// Build both callback links, URL-escaping the token.
pub fn callback_links(endpoint: &str, task_token: &str) -> CallbackLinks {
    let base = endpoint.trim_end_matches('/');
    let token = urlencoding::encode(task_token);
    CallbackLinks {
        approve: format!("{base}/approve?taskToken={token}"),
        deny: format!("{base}/deny?taskToken={token}"),
    }
}

fn decision_html(role_arn: &str, max_days: u32, links: &CallbackLinks) -> String {
    format!(
        "<html>\n\
         <p>Hello!</p>\n\
         <p>This IAM Role {role_arn} has not been used for more than {max_days} days.</p>\n\
         <p>You can delete the role by following this link: \
         <a href=\"{approve}\">Approve link</a></p>\n\
         <p>Or keep this role by following this link: \
         <a href=\"{deny}\">Deny link</a></p>\n\
         </html>\n",
        approve = links.approve,
        deny = links.deny,
    )
}

/// Returned to the driver once the request is sent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalReceipt {
    pub role_arn: String,
    pub recipient: String,
}

/// Build the decision request for an approval event.
pub fn decision_request(
    event: &ApprovalEvent,
    endpoint: &str,
    sender: &str,
) -> Result<DecisionRequest, AwsError> {
    event
        .validate()
        .map_err(|e| AwsError::Validation(e.to_string()))?;

    let fields = &event.finding.user_defined_fields;
    if fields.owner_email.trim().is_empty() {
        return Err(AwsError::Validation(format!(
            "finding {} has no owner email",
            event.finding.role_arn()
        )));
    }

    let links = callback_links(endpoint, &event.task_token);
    Ok(DecisionRequest {
        to: fields.owner_email.clone(),
        from: sender.to_string(),
        subject: DECISION_SUBJECT.to_string(),
        html: decision_html(event.finding.role_arn(), fields.max_days, &links),
    })
}

/// Send the decision request for one finding.
pub async fn request_approval<N: Notifier>(
    notifier: &N,
    event: &ApprovalEvent,
    endpoint: &str,
    sender: &str,
) -> Result<ApprovalReceipt, AwsError> {
    let request = decision_request(event, endpoint, sender)?;
    notifier.send(&request).await?;

    info!(
        role_arn = %event.finding.role_arn(),
        recipient = %request.to,
        "Approval requested"
    );
    Ok(ApprovalReceipt {
        role_arn: event.finding.role_arn().to_string(),
        recipient: request.to,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aws::notify::MockNotifier;
    use chrono::Utc;
    use rolesweep_common::finding::{Finding, FindingContext};
    use rolesweep_test_utils::RoleRecordBuilder;

    fn event(token: &str, owner: &str) -> ApprovalEvent {
        let role = RoleRecordBuilder::new("R1")
            .last_used_days_ago(75, "us-east-1")
            .build();
        let ctx = FindingContext {
            security_account_id: "999988887777".to_string(),
            product_arn: "arn:aws:securityhub:us-west-2:999988887777:product/999988887777/default"
                .to_string(),
            observed_at: Utc::now(),
            max_days: 60,
        };
        ApprovalEvent {
            task_token: token.to_string(),
            finding: Finding::unused_role(&role, owner, 75, &ctx),
        }
    }

    #[test]
    fn token_is_escaped_in_both_links() {
        let links = callback_links("https://approvals.example.com/", "a+b/c=d e");
        assert_eq!(
            links.approve,
            "https://approvals.example.com/approve?taskToken=a%2Bb%2Fc%3Dd%20e"
        );
        assert_eq!(
            links.deny,
            "https://approvals.example.com/deny?taskToken=a%2Bb%2Fc%3Dd%20e"
        );
    }

    #[test]
    fn request_contains_both_links() {
        let request =
            decision_request(&event("tok123", "owner@example.com"), "https://x", "sec@example.com")
                .unwrap();

        assert_eq!(request.to, "owner@example.com");
        assert_eq!(request.subject, DECISION_SUBJECT);
        assert!(request.html.contains("https://x/approve?taskToken=tok123"));
        assert!(request.html.contains("https://x/deny?taskToken=tok123"));
        assert!(request.html.contains("arn:aws:iam::111122223333:role/R1"));
        assert!(request.html.contains("more than 60 days"));
    }

    #[test]
    fn empty_token_is_rejected() {
        let result = decision_request(&event("", "owner@example.com"), "https://x", "s@x");
        assert!(matches!(result, Err(AwsError::Validation(_))));
    }

    #[tokio::test]
    async fn send_failure_is_surfaced() {
        let mut notifier = MockNotifier::new();
        notifier
            .expect_send()
            .times(1)
            .returning(|_| Err(AwsError::Throttled));

        let result =
            request_approval(&notifier, &event("t", "o@example.com"), "https://x", "s@x").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn request_goes_to_owner() {
        let mut notifier = MockNotifier::new();
        notifier
            .expect_send()
            .withf(|r| r.to == "o@example.com" && r.from == "s@x")
            .times(1)
            .returning(|_| Ok(()));

        let receipt =
            request_approval(&notifier, &event("t", "o@example.com"), "https://x", "s@x")
                .await
                .unwrap();
        assert_eq!(receipt.recipient, "o@example.com");
    }
}
