//! Storage health checks

use anyhow::Result;
use opendal::Operator;

/// Verify the storage endpoint is reachable by listing the root
pub async fn check_health(op: &Operator) -> Result<()> {
    op.list("/")
        .await
        .map(|_| ())
        .map_err(|e| anyhow::anyhow!("storage health check failed: {e}"))
}

/// Verify the share server API answers `GET /api/health`
pub async fn check_api_health(client: &reqwest::Client, api_base: &str) -> Result<()> {
    let url = format!("{}/api/health", api_base.trim_end_matches('/'));
    let resp = client
        .get(&url)
        .send()
        .await
        .map_err(|e| anyhow::anyhow!("share server unreachable: {e}"))?;
    if !resp.status().is_success() {
        anyhow::bail!("share server health check failed: {}", resp.status());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_operator_is_healthy() {
        let op = crate::operator::build_memory_operator().unwrap();
        assert!(check_health(&op).await.is_ok());
    }
}
