//! Automation masking and mobile device emulation.
//!
//! Applied to every fresh page before navigation: an
//! evaluate-on-new-document script that hides the `navigator.webdriver`
//! flag (and the most common secondary tells), plus a randomized mobile
//! device profile so the target serves its lightweight mobile markup.
//!
//! Masking is best-effort. A failure here degrades detection resistance but
//! must never fail the task, so callers treat errors as warnings.

use anyhow::Result;
use chromiumoxide::{Page, cdp};
use rand::seq::IndexedRandom;
use tracing::debug;

/// A phone profile: viewport, scale, user agent, locale.
#[derive(Debug, Clone, Copy)]
pub struct DeviceProfile {
    pub width: i64,
    pub height: i64,
    pub scale_factor: f64,
    pub user_agent: &'static str,
    pub locale: &'static str,
    pub platform: &'static str,
}

/// Pool of real-world phone profiles to rotate through, one per context.
pub const DEVICE_PROFILES: &[DeviceProfile] = &[
    DeviceProfile {
        width: 390,
        height: 844,
        scale_factor: 2.0,
        user_agent: "Mozilla/5.0 (iPhone; CPU iPhone OS 14_4 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/14.0.3 Mobile/15E148 Safari/604.1",
        locale: "en-US",
        platform: "iPhone",
    },
    DeviceProfile {
        width: 375,
        height: 667,
        scale_factor: 2.0,
        user_agent: "Mozilla/5.0 (iPhone; CPU iPhone OS 13_5_1 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/13.1.1 Mobile/15E148 Safari/604.1",
        locale: "en-GB",
        platform: "iPhone",
    },
    DeviceProfile {
        width: 414,
        height: 896,
        scale_factor: 2.0,
        user_agent: "Mozilla/5.0 (iPhone; CPU iPhone OS 13_2_3 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/13.0.3 Mobile/15E148 Safari/604.1",
        locale: "en-US",
        platform: "iPhone",
    },
    DeviceProfile {
        width: 360,
        height: 640,
        scale_factor: 1.0,
        user_agent: "Mozilla/5.0 (Linux; Android 8.0.0; SM-G950F Build/R16NW) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/63.0.3239.111 Mobile Safari/537.36",
        locale: "en-GB",
        platform: "Linux armv8l",
    },
    DeviceProfile {
        width: 412,
        height: 915,
        scale_factor: 2.0,
        user_agent: "Mozilla/5.0 (Linux; Android 11; Pixel 5) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/90.0.4430.91 Mobile Safari/537.36",
        locale: "en-US",
        platform: "Linux armv8l",
    },
];

/// Script injected before any page script runs.
///
/// `navigator.webdriver` is the standard automation flag; the plugin and
/// language shims cover the follow-up checks bot detectors pair with it.
const MASK_SCRIPT: &str = r"
    Object.defineProperty(navigator, 'webdriver', { get: () => false });
    Object.defineProperty(navigator, 'languages', { get: () => ['en-US', 'en'] });
    Object.defineProperty(navigator, 'plugins', {
        get: () => ({ length: 3, item: () => null, namedItem: () => null })
    });
    if (!window.chrome) {
        window.chrome = { runtime: {} };
    }
";

/// Pick a random device profile for a fresh browsing context.
#[must_use]
pub fn random_profile() -> &'static DeviceProfile {
    let mut rng = rand::rng();
    DEVICE_PROFILES
        .choose(&mut rng)
        .unwrap_or(&DEVICE_PROFILES[0])
}

/// Configure a fresh page with the masking script and the device profile.
///
/// Must run before the first navigation: the mask script only applies to
/// documents created after it is registered.
pub async fn prepare_page(page: &Page, profile: &DeviceProfile) -> Result<()> {
    page.execute(
        cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams {
            source: MASK_SCRIPT.to_string(),
            include_command_line_api: None,
            world_name: None,
            run_immediately: None,
        },
    )
    .await?;

    page.execute(
        cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams::builder()
            .width(profile.width)
            .height(profile.height)
            .device_scale_factor(profile.scale_factor)
            .mobile(true)
            .build()
            .map_err(anyhow::Error::msg)?,
    )
    .await?;

    page.execute(cdp::browser_protocol::network::SetUserAgentOverrideParams {
        user_agent: profile.user_agent.to_string(),
        accept_language: Some(profile.locale.to_string()),
        platform: Some(profile.platform.to_string()),
        user_agent_metadata: None,
    })
    .await?;

    debug!(
        "Stealth profile applied: {}x{} {}",
        profile.width, profile.height, profile.locale
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profiles_are_mobile_sized() {
        for profile in DEVICE_PROFILES {
            assert!(profile.width < 500, "{} too wide", profile.user_agent);
            assert!(profile.user_agent.contains("Mobile"));
        }
    }

    #[test]
    fn mask_script_hides_webdriver() {
        assert!(MASK_SCRIPT.contains("webdriver"));
    }
}
