//! 会话令牌
//!
//! 账号体系在外围服务里；这里只负责把握手或请求头携带的令牌解析成
//! 身份。令牌无效时连接保持未绑定，而不是拒绝握手。

use async_trait::async_trait;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use application::SessionResolver;
use config::SessionConfig;
use domain::UserId;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    exp: usize,
}

pub struct SessionTokens {
    config: SessionConfig,
}

impl SessionTokens {
    pub fn new(config: SessionConfig) -> Self {
        Self { config }
    }

    /// 为用户签发会话令牌。
    pub fn issue(&self, user_id: UserId) -> Result<String, jsonwebtoken::errors::Error> {
        let expires_at = chrono::Utc::now() + chrono::Duration::hours(self.config.expiration_hours);
        let claims = Claims {
            sub: user_id.to_string(),
            exp: expires_at.timestamp() as usize,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.config.secret.as_bytes()),
        )
    }

    fn validate(&self, token: &str) -> Option<UserId> {
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.config.secret.as_bytes()),
            &Validation::default(),
        )
        .ok()?;
        Uuid::parse_str(&data.claims.sub).ok().map(UserId::from)
    }
}

#[async_trait]
impl SessionResolver for SessionTokens {
    async fn resolve(&self, token: &str) -> Option<UserId> {
        self.validate(token)
    }
}
