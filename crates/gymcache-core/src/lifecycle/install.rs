use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// iPhone, iPad and iPod browsers. No native install prompt.
    Ios,
    Android,
    Desktop,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Platform::Ios => "iOS",
            Platform::Android => "Android",
            Platform::Desktop => "Desktop",
        };
        f.write_str(s)
    }
}

pub fn detect_platform(user_agent: &str) -> Platform {
    let ua = user_agent.to_ascii_lowercase();
    if ["iphone", "ipad", "ipod"].iter().any(|d| ua.contains(d)) {
        Platform::Ios
    } else if ua.contains("android") {
        Platform::Android
    } else {
        Platform::Desktop
    }
}

/// What the host knows about the current session.
#[derive(Debug, Clone, Default)]
pub struct InstallContext {
    pub user_agent: String,
    /// Already running as an installed app.
    pub standalone: bool,
    /// The browser offered a native install prompt this session.
    pub native_prompt_available: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallInstructions {
    pub platform: Platform,
    pub title: String,
    pub steps: Vec<String>,
}

impl InstallInstructions {
    pub fn for_platform(platform: Platform) -> Self {
        let steps: &[&str] = match platform {
            Platform::Ios => &[
                "Tap the Share button in the browser toolbar.",
                "Scroll down and tap \"Add to Home Screen\".",
                "Tap \"Add\" to confirm.",
            ],
            Platform::Android | Platform::Desktop => &[
                "Open the browser menu.",
                "Choose \"Install app\" or \"Add to Home screen\".",
                "Confirm the installation.",
            ],
        };
        Self {
            platform,
            title: format!("Install on {}", platform),
            steps: steps.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallAffordance {
    AlreadyInstalled,
    /// Trigger the browser's own install prompt.
    Native,
    Manual(InstallInstructions),
}

pub fn install_affordance(context: &InstallContext) -> InstallAffordance {
    if context.standalone {
        return InstallAffordance::AlreadyInstalled;
    }
    if context.native_prompt_available {
        return InstallAffordance::Native;
    }
    InstallAffordance::Manual(InstallInstructions::for_platform(detect_platform(
        &context.user_agent,
    )))
}
