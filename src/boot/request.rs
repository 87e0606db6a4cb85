//! Fire-and-forget requests to manager services.

use crate::connection::Connection;
use crate::types::join_topic;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use uuid::Uuid;

/// A request envelope. `payload` fields are flattened into the JSON object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerRequest<P> {
    pub sender_name: String,
    pub uuid: String,
    #[serde(flatten)]
    pub payload: P,
}

/// Publish `payload` to `<service>/request/<verb>`.
///
/// Returns the request id, or `None` if the payload could not be encoded.
/// Nothing waits for a reply.
pub fn send_request<P: Serialize>(
    connection: &Connection,
    service: &str,
    verb: &str,
    payload: P,
) -> Option<String> {
    let request = ManagerRequest {
        sender_name: connection.config().client_name.clone(),
        uuid: Uuid::new_v4().to_string(),
        payload,
    };
    let topic = join_topic(Some(service), &join_topic(Some("request"), verb));

    match serde_json::to_vec(&request) {
        Ok(body) => {
            debug!("Sending {} request {}", topic, request.uuid);
            connection.publish(&topic, body, false);
            Some(request.uuid)
        }
        Err(e) => {
            error!("Cannot encode {} request: {}", topic, e);
            None
        }
    }
}
