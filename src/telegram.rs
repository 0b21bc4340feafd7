use serde_json::Value;

use crate::memory::Identity;

pub(crate) struct ParsedUpdate {
    pub(crate) chat_id: i64,
    pub(crate) user_id: i64,
    pub(crate) user_name: String,
    pub(crate) text: String,
}

impl ParsedUpdate {
    pub(crate) fn identity(&self) -> Identity {
        Identity::new(self.chat_id, self.user_id)
    }
}

pub(crate) fn update_id(update: &Value) -> Option<i64> {
    update["update_id"].as_i64()
}

/// Parse a Telegram update into the fields we act on.
/// Returns None for anything that is not a non-empty text message from a user.
pub(crate) fn parse_update(update: &Value) -> Option<ParsedUpdate> {
    let message = &update["message"];
    let text = match message["text"].as_str() {
        Some(t) if !t.trim().is_empty() => t.to_string(),
        _ => return None,
    };
    let chat_id = message["chat"]["id"].as_i64()?;
    let user_id = message["from"]["id"].as_i64()?;
    if message["from"]["is_bot"].as_bool().unwrap_or(false) {
        return None;
    }
    let user_name = message["from"]["username"]
        .as_str()
        .or_else(|| message["from"]["first_name"].as_str())
        .unwrap_or("unknown")
        .to_string();

    Some(ParsedUpdate {
        chat_id,
        user_id,
        user_name,
        text,
    })
}

/// Split `/name@bot args` into `("name", "args")`. None if `text` is not a command.
pub(crate) fn parse_command(text: &str) -> Option<(&str, &str)> {
    let rest = text.trim().strip_prefix('/')?;
    let (head, args) = match rest.split_once(char::is_whitespace) {
        Some((h, a)) => (h, a.trim()),
        None => (rest, ""),
    };
    let name = head.split('@').next().unwrap_or(head);
    if name.is_empty() {
        return None;
    }
    Some((name, args))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn text_update(text: &str) -> Value {
        json!({
            "update_id": 100,
            "message": {
                "message_id": 5,
                "from": {"id": 42, "is_bot": false, "first_name": "Ada", "username": "ada"},
                "chat": {"id": -1001, "type": "supergroup"},
                "date": 1700000000,
                "text": text
            }
        })
    }

    #[test]
    fn test_parse_text_message() {
        let parsed = parse_update(&text_update("hello")).unwrap();
        assert_eq!(parsed.chat_id, -1001);
        assert_eq!(parsed.user_id, 42);
        assert_eq!(parsed.user_name, "ada");
        assert_eq!(parsed.text, "hello");
        assert_eq!(parsed.identity(), Identity::new(-1001, 42));
    }

    #[test]
    fn test_parse_falls_back_to_first_name() {
        let mut update = text_update("hi");
        update["message"]["from"]
            .as_object_mut()
            .unwrap()
            .remove("username");
        assert_eq!(parse_update(&update).unwrap().user_name, "Ada");
    }

    #[test]
    fn test_parse_skips_empty_text() {
        assert!(parse_update(&text_update("   ")).is_none());
    }

    #[test]
    fn test_parse_skips_non_text_message() {
        let update = json!({
            "update_id": 1,
            "message": {
                "from": {"id": 1, "is_bot": false},
                "chat": {"id": 1},
                "photo": [{"file_id": "abc"}]
            }
        });
        assert!(parse_update(&update).is_none());
    }

    #[test]
    fn test_parse_skips_bots() {
        let mut update = text_update("beep");
        update["message"]["from"]["is_bot"] = json!(true);
        assert!(parse_update(&update).is_none());
    }

    #[test]
    fn test_parse_skips_missing_sender() {
        let update = json!({"update_id": 3, "message": {"chat": {"id": 1}, "text": "anon"}});
        assert!(parse_update(&update).is_none());
    }

    #[test]
    fn test_parse_skips_edited_message() {
        let update = json!({
            "update_id": 4,
            "edited_message": {"from": {"id": 1}, "chat": {"id": 1}, "text": "edit"}
        });
        assert!(parse_update(&update).is_none());
        assert_eq!(update_id(&update), Some(4));
    }

    #[test]
    fn test_parse_command_plain() {
        assert_eq!(parse_command("/reset"), Some(("reset", "")));
        assert_eq!(parse_command("  /privacy  "), Some(("privacy", "")));
    }

    #[test]
    fn test_parse_command_with_bot_suffix_and_args() {
        assert_eq!(parse_command("/memory_off@MemBot"), Some(("memory_off", "")));
        assert_eq!(parse_command("/help@MemBot  please "), Some(("help", "please")));
    }

    #[test]
    fn test_parse_command_rejects_plain_text() {
        assert_eq!(parse_command("hello /reset"), None);
        assert_eq!(parse_command("/"), None);
        assert_eq!(parse_command("/@bot"), None);
    }
}
