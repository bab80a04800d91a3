// src/chain/services/farcaster.rs

use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::chain::provider::Connection;
use crate::chain::services::from_params;
use crate::error::Result;

const NEYNAR_API_URL: &str = "https://api.neynar.com/v2/farcaster";

/// Public demo key, enough for basic read operations.
const DEMO_API_KEY: &str = "NEYNAR_API_DOCS";

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FarcasterOp {
    GetCast,
    GetUser,
    GetUserByUsername,
    ValidateFrameMessage,
    GetCastsByFid,
    GetChannel,
    GetFollowers,
    GetFollowing,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CastParams {
    cast_hash: String,
}

fn default_limit() -> u64 {
    25
}

#[derive(Debug, Deserialize)]
struct FidParams {
    fid: u64,
    #[serde(default = "default_limit")]
    limit: u64,
}

#[derive(Debug, Deserialize)]
struct UsernameParams {
    username: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FrameParams {
    frame_message: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelParams {
    channel_id: String,
}

struct NeynarClient {
    http: Client,
    api_key: String,
}

impl NeynarClient {
    fn new(conn: &Connection) -> Self {
        NeynarClient {
            http: Client::new(),
            api_key: conn
                .neynar_api_key
                .clone()
                .unwrap_or_else(|| DEMO_API_KEY.to_string()),
        }
    }

    async fn get(&self, path_and_query: &str) -> Result<Value> {
        let url = format!("{NEYNAR_API_URL}{path_and_query}");
        let body: Value = self
            .http
            .get(&url)
            .header("accept", "application/json")
            .header("api_key", &self.api_key)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(body)
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value> {
        let url = format!("{NEYNAR_API_URL}{path}");
        let response: Value = self
            .http
            .post(&url)
            .header("accept", "application/json")
            .header("api_key", &self.api_key)
            .json(body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response)
    }
}

pub async fn execute(conn: &Connection, op: FarcasterOp, params: &Value) -> Result<Value> {
    let client = NeynarClient::new(conn);
    match op {
        FarcasterOp::GetCast => {
            let p: CastParams = from_params(params)?;
            match client
                .get(&format!("/cast?identifier={}&type=hash", p.cast_hash))
                .await
            {
                Ok(body) => Ok(body["cast"].clone()),
                Err(e) => Ok(json!({
                    "error": "Failed to fetch cast",
                    "hash": p.cast_hash,
                    "message": e.to_string(),
                })),
            }
        }
        FarcasterOp::GetUser => {
            let p: FidParams = from_params(params)?;
            match client.get(&format!("/user/bulk?fids={}", p.fid)).await {
                Ok(body) => Ok(body["users"]
                    .get(0)
                    .cloned()
                    .unwrap_or_else(|| json!({"error": "User not found"}))),
                Err(e) => Ok(json!({
                    "error": "Failed to fetch user",
                    "fid": p.fid,
                    "message": e.to_string(),
                })),
            }
        }
        FarcasterOp::GetUserByUsername => {
            let p: UsernameParams = from_params(params)?;
            match client
                .get(&format!("/user/by_username?username={}", p.username))
                .await
            {
                Ok(body) => Ok(body["user"].clone()),
                Err(e) => Ok(json!({
                    "error": "Failed to fetch user",
                    "username": p.username,
                    "message": e.to_string(),
                })),
            }
        }
        FarcasterOp::ValidateFrameMessage => {
            let p: FrameParams = from_params(params)?;
            let message = match &p.frame_message {
                Value::String(s) => serde_json::from_str(s).unwrap_or(Value::Null),
                other => other.clone(),
            };
            let message_bytes = message["trustedData"]["messageBytes"].clone();
            match client
                .post("/frame/validate", &json!({"message_bytes_in_hex": message_bytes}))
                .await
            {
                Ok(body) => Ok(json!({
                    "valid": body["valid"],
                    "action": body["action"],
                })),
                Err(e) => Ok(json!({
                    "valid": false,
                    "error": "Validation failed",
                    "message": e.to_string(),
                })),
            }
        }
        FarcasterOp::GetCastsByFid => {
            let p: FidParams = from_params(params)?;
            match client
                .get(&format!("/feed/user/{}/casts?limit={}", p.fid, p.limit))
                .await
            {
                Ok(body) => {
                    let count = body["casts"].as_array().map(|a| a.len()).unwrap_or(0);
                    Ok(json!({"casts": body["casts"], "count": count}))
                }
                Err(e) => Ok(json!({
                    "error": "Failed to fetch casts",
                    "fid": p.fid,
                    "message": e.to_string(),
                })),
            }
        }
        FarcasterOp::GetChannel => {
            let p: ChannelParams = from_params(params)?;
            match client.get(&format!("/channel?id={}", p.channel_id)).await {
                Ok(body) => Ok(body["channel"].clone()),
                Err(e) => Ok(json!({
                    "error": "Failed to fetch channel",
                    "channelId": p.channel_id,
                    "message": e.to_string(),
                })),
            }
        }
        FarcasterOp::GetFollowers => {
            let p: FidParams = from_params(params)?;
            match client
                .get(&format!("/followers?fid={}&limit={}", p.fid, p.limit))
                .await
            {
                Ok(body) => {
                    let count = body["users"].as_array().map(|a| a.len()).unwrap_or(0);
                    Ok(json!({"followers": body["users"], "count": count}))
                }
                Err(e) => Ok(json!({
                    "error": "Failed to fetch followers",
                    "fid": p.fid,
                    "message": e.to_string(),
                })),
            }
        }
        FarcasterOp::GetFollowing => {
            let p: FidParams = from_params(params)?;
            match client
                .get(&format!("/following?fid={}&limit={}", p.fid, p.limit))
                .await
            {
                Ok(body) => {
                    let count = body["users"].as_array().map(|a| a.len()).unwrap_or(0);
                    Ok(json!({"following": body["users"], "count": count}))
                }
                Err(e) => Ok(json!({
                    "error": "Failed to fetch following",
                    "fid": p.fid,
                    "message": e.to_string(),
                })),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fid_params_default_limit() {
        let p: FidParams = serde_json::from_value(json!({"fid": 3})).unwrap();
        assert_eq!(p.limit, 25);
    }

    #[test]
    fn operation_names() {
        let op: FarcasterOp = serde_json::from_value(json!("validateFrameMessage")).unwrap();
        assert!(matches!(op, FarcasterOp::ValidateFrameMessage));
    }
}
