use msi_types::Caps;
use tracing::info;

use crate::error::{SubstrateError, SubstrateResult};
use crate::substrate::Substrate;

/// Rejects descriptors a host cannot run on.
pub fn validate_caps(caps: &Caps) -> SubstrateResult<()> {
    if caps.lanes.min < 1 {
        return Err(SubstrateError::Bootstrap(
            "substrate must support at least one lane".into(),
        ));
    }
    if let Some(max) = caps.lanes.max {
        if max < caps.lanes.min {
            return Err(SubstrateError::Bootstrap(format!(
                "lane bounds are inverted (min {}, max {max})",
                caps.lanes.min
            )));
        }
    }
    Ok(())
}

/// Host-side startup check: validates the advertised capabilities, logs them
/// and runs attestation when the substrate offers it.
pub async fn bootstrap_substrate(substrate: &Substrate) -> SubstrateResult<Caps> {
    let caps = substrate.capabilities();
    validate_caps(&caps)?;
    info!(
        version = %substrate.version(),
        lanes_min = caps.lanes.min,
        lanes_max = ?caps.lanes.max,
        state = ?caps.state.model,
        clock = ?caps.clock.model,
        security = ?caps.security.model,
        "substrate ready"
    );
    if caps.security.attest {
        let attestation = substrate.attest().await;
        info!(present = attestation.present, provider = ?attestation.provider, "attestation");
    }
    Ok(caps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SubstrateConfig;

    #[tokio::test]
    async fn default_substrate_bootstraps() {
        let msi = Substrate::new(SubstrateConfig::default()).unwrap();
        let caps = bootstrap_substrate(&msi).await.unwrap();
        assert_eq!(caps, msi.capabilities());
    }

    #[tokio::test]
    async fn zero_lane_descriptors_are_rejected() {
        let msi = Substrate::new(SubstrateConfig::default()).unwrap();
        let mut caps = msi.capabilities();
        caps.lanes.min = 0;
        assert!(matches!(validate_caps(&caps), Err(SubstrateError::Bootstrap(_))));

        caps.lanes.min = 4;
        caps.lanes.max = Some(2);
        assert!(validate_caps(&caps).is_err());
    }
}
