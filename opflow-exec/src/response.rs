use opflow_core::NO_CONTENT;
use serde_json::Value as JsonValue;

use crate::transport::ResponseParts;

/// Parses the body as JSON. A 204 with an unparseable (usually empty) body
/// yields `Null` instead of an error.
pub(crate) fn parse_body(resp: &ResponseParts) -> Result<JsonValue, String> {
    match serde_json::from_slice::<JsonValue>(&resp.body) {
        Ok(v) => Ok(v),
        Err(_) if resp.status == NO_CONTENT => Ok(JsonValue::Null),
        Err(e) => Err(format!(
            "failed to parse response body (status {}): {e}",
            resp.status
        )),
    }
}
