use aws_sdk_sts::error::DisplayErrorContext;

use crate::error::NotifierError;

/// Account the notifier runs under, needed to address the notification topics.
pub async fn resolve_account_id(sdk_config: &aws_config::SdkConfig) -> Result<String, NotifierError> {
    let sts = aws_sdk_sts::Client::new(sdk_config);

    let identity = sts.get_caller_identity()
        .send()
        .await
        .map_err(|err| NotifierError::Identity(format!("GetCallerIdentity failed: {}", DisplayErrorContext(err))))?;

    identity.account()
        .map(str::to_string)
        .ok_or_else(|| NotifierError::Identity("GetCallerIdentity returned no account".to_string()))
}
