use std::sync::LazyLock;

use thiserror::Error;
use tokio::sync::OnceCell;

static ENV_VARS: LazyLock<OnceCell<Env>> = LazyLock::new(OnceCell::new);

pub async fn env_config() -> EnvResult<&'static Env> {
    ENV_VARS.get_or_try_init(|| async { Env::load() }).await
}

pub async fn get_var(var: Var) -> EnvResult<&'static str> {
    let vars = env_config().await?;
    Ok(match var {
        Var::RedisUrl => &vars.redis_url,
        Var::ServerApiPort => &vars.server_api_port,
        Var::CorsAllowOrigins => &vars.cors_allow_origins,
        Var::ReviewEventSecret => &vars.review_event_secret,
    })
}

#[derive(Debug, Clone)]
pub struct Env {
    pub redis_url: String,
    pub server_api_port: String,
    pub cors_allow_origins: String,
    pub review_event_secret: String,
    /// Unset or empty disables the badge unlock notifier.
    pub badge_webhook_url: Option<String>,
}

#[derive(Debug)]
pub enum Var {
    RedisUrl,
    ServerApiPort,
    CorsAllowOrigins,
    ReviewEventSecret,
}

#[macro_export]
macro_rules! var {
    ($ev:expr) => {
        $crate::util::env::get_var($ev)
    };
}

impl Env {
    pub fn load() -> EnvResult<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> EnvResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            redis_url: required(&lookup, "REDIS_URL")?,
            server_api_port: required(&lookup, "SERVER_API_PORT")?,
            cors_allow_origins: required(&lookup, "CORS_ALLOW_ORIGINS")?,
            review_event_secret: required(&lookup, "REVIEW_EVENT_SECRET")?,
            badge_webhook_url: lookup("BADGE_WEBHOOK_URL").filter(|url| !url.is_empty()),
        })
    }
}

fn required<F>(lookup: &F, key: &'static str) -> EnvResult<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).ok_or(EnvErr::MissingValue(key))
}

pub type EnvResult<T> = core::result::Result<T, EnvErr>;

#[derive(Debug, Error)]
pub enum EnvErr {
    #[error("missing required environment variable '{0}'")]
    MissingValue(&'static str),
}
