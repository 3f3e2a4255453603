use serde::{Deserialize, Serialize};
use serde_json::Value;

use hadron_common::H256;
use hadron_common::types::{Atom, AtomAction, ProcessedAtomData};

use crate::submission::SubmissionState;

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum RpcRequestId {
    Number(u64),
    String(String),
}

#[derive(Serialize, Deserialize, Debug)]
pub struct RpcRequest {
    pub id: RpcRequestId,
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl RpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            id: RpcRequestId::Number(id),
            jsonrpc: "2.0".to_string(),
            method: method.into(),
            params,
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct RpcSuccessResponse {
    pub id: RpcRequestId,
    pub jsonrpc: String,
    pub result: Value,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct RpcErrorMetadata {
    pub code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    pub message: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct RpcErrorResponse {
    pub id: RpcRequestId,
    pub jsonrpc: String,
    pub error: RpcErrorMetadata,
}

/// Server-push frame: carries a method but no request id.
#[derive(Serialize, Deserialize, Debug)]
pub struct RpcNotification {
    pub jsonrpc: String,
    pub method: String,
    pub params: Value,
}

/// Any frame the node can send us.
#[derive(Deserialize, Debug)]
#[serde(untagged)]
pub enum IncomingFrame {
    Success(RpcSuccessResponse),
    Error(RpcErrorResponse),
    Notification(RpcNotification),
}

/// An atom as transported on the wire: the node's claimed content id next to
/// the content itself, so the receiver can recompute and compare.
#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AtomEnvelope {
    pub hid: H256,
    /// Absent on today's nodes, which only ever push STORE.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<AtomAction>,
    pub atom: Atom,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_data: Option<ProcessedAtomData>,
}

/// `Atoms.subscribeUpdate` payload.
#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AtomSubscriptionUpdate {
    pub subscriber_id: u64,
    pub atoms: Vec<AtomEnvelope>,
}

/// `AtomSubmissionState.onNext` payload.
#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionStateNotification {
    pub subscriber_id: u64,
    pub value: SubmissionState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// `Network.getSelf` result. Only the fields the core cares about; nodes are
/// free to send more.
#[derive(Clone, Serialize, Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct NodeInfo {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_are_told_apart_by_shape() {
        let success: IncomingFrame = serde_json::from_str(
            r#"{"id": 1, "jsonrpc": "2.0", "result": true}"#,
        )
        .expect("success frame");
        assert!(matches!(success, IncomingFrame::Success(_)));

        let error: IncomingFrame = serde_json::from_str(
            r#"{"id": 1, "jsonrpc": "2.0", "error": {"code": -32601, "message": "no"}}"#,
        )
        .expect("error frame");
        assert!(matches!(error, IncomingFrame::Error(_)));

        let push: IncomingFrame = serde_json::from_str(
            r#"{"jsonrpc": "2.0", "method": "Atoms.subscribeUpdate", "params": {"subscriberId": 3, "atoms": []}}"#,
        )
        .expect("notification frame");
        assert!(matches!(push, IncomingFrame::Notification(_)));
    }

    #[test]
    fn envelope_action_defaults_to_absent() {
        let envelope: AtomEnvelope = serde_json::from_value(serde_json::json!({
            "hid": "0x0000000000000000000000000000000000000000000000000000000000000000",
            "atom": {"timestamp": 1, "particles": []},
        }))
        .expect("envelope");
        assert!(envelope.action.is_none());
        assert!(envelope.processed_data.is_none());
    }
}
