use rand::seq::IndexedRandom;

/// Desktop user agents the browser identifies as, one picked per session.
pub const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/129.0.0.0 Safari/537.36 Edg/129.0.0.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_5) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.5 Safari/605.1.15",
];

pub fn random_user_agent() -> &'static str {
    USER_AGENTS
        .choose(&mut rand::rng())
        .copied()
        .unwrap_or(USER_AGENTS[0])
}

/// Browser launch settings that hide the usual automation markers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchOptions {
    pub user_agent: String,
    pub arguments: Vec<String>,
    pub exclude_switches: Vec<String>,
    pub use_automation_extension: bool,
    pub headless: bool,
}

impl LaunchOptions {
    /// Options with a user agent drawn from [`USER_AGENTS`].
    pub fn randomized(headless: bool) -> Self {
        Self::with_user_agent(random_user_agent(), headless)
    }

    pub fn with_user_agent(user_agent: impl Into<String>, headless: bool) -> Self {
        Self {
            user_agent: user_agent.into(),
            arguments: vec!["--disable-blink-features=AutomationControlled".to_string()],
            exclude_switches: vec!["enable-automation".to_string()],
            use_automation_extension: false,
            headless,
        }
    }

    /// Command-line arguments passed to the browser binary.
    pub fn browser_args(&self) -> Vec<String> {
        let mut args = self.arguments.clone();
        args.push(format!("--user-agent={}", self.user_agent));
        if self.headless {
            args.push("--headless=new".to_string());
        }
        args
    }
}
