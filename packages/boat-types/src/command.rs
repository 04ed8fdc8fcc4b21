use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Shore command envelope: `{"Command": <name>, "Argument": <any>}`.
///
/// The argument shape is command-specific and validated by the handler;
/// the envelope itself only guarantees a name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommandMsg {
    #[serde(rename = "Command")]
    pub name: String,
    #[serde(rename = "Argument", default)]
    pub args: Value,
}

impl CommandMsg {
    pub fn new(name: impl Into<String>, args: Value) -> Self {
        Self { name: name.into(), args }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_round_trip() {
        let msg: CommandMsg =
            serde_json::from_str(r#"{"Command":"SetPID","Argument":{"Kp":1.0,"Ki":0.1,"Kd":0.05}}"#)
                .unwrap();
        assert_eq!(msg.name, "SetPID");
        assert_eq!(msg.args["Kp"], json!(1.0));
    }

    #[test]
    fn argument_is_optional() {
        let msg: CommandMsg = serde_json::from_str(r#"{"Command":"FetchWaypoints"}"#).unwrap();
        assert_eq!(msg.name, "FetchWaypoints");
        assert!(msg.args.is_null());
    }
}
