//! Key encode/decode commands.

use kinddb_core::{Key, KeyId};
use serde::Serialize;

/// Decoded key representation for output.
#[derive(Debug, Serialize)]
pub struct KeyInfo {
    /// Application id.
    pub app: String,
    /// Namespace.
    pub namespace: String,
    /// Path as `(kind, id)` pairs, root first.
    pub path: Vec<(String, String)>,
    /// Kind of the last element.
    pub kind: String,
    /// URL-safe form.
    pub urlsafe: String,
}

impl From<&Key> for KeyInfo {
    fn from(key: &Key) -> Self {
        Self {
            app: key.app().to_string(),
            namespace: key.namespace().to_string(),
            path: key
                .pairs()
                .iter()
                .map(|e| {
                    let id = match e.id() {
                        Some(KeyId::Int(n)) => n.to_string(),
                        Some(KeyId::Name(name)) => name.clone(),
                        None => String::new(),
                    };
                    (e.kind().to_string(), id)
                })
                .collect(),
            kind: key.kind().to_string(),
            urlsafe: key.urlsafe(),
        }
    }
}

/// Parses `Kind:id` into a path pair. All-digit ids are numeric.
pub fn parse_pair(pair: &str) -> Result<(String, KeyId), String> {
    let (kind, id) = pair
        .split_once(':')
        .ok_or_else(|| format!("expected Kind:id, got {pair:?}"))?;
    let id = match id.parse::<i64>() {
        Ok(n) => KeyId::Int(n),
        Err(_) => KeyId::Name(id.to_string()),
    };
    Ok((kind.to_string(), id))
}

/// Builds a key from `Kind:id` pairs and prints its URL-safe form.
pub fn encode(
    pairs: &[String],
    app: Option<&str>,
    namespace: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let pairs = pairs
        .iter()
        .map(|p| parse_pair(p))
        .collect::<Result<Vec<_>, _>>()?;
    let mut key = Key::from_pairs(pairs)?;
    if let Some(app) = app {
        key = key.in_app(app);
    }
    if let Some(namespace) = namespace {
        key = key.in_namespace(namespace);
    }
    println!("{}", key.urlsafe());
    Ok(())
}

/// Decodes a URL-safe key and prints its parts.
pub fn decode(urlsafe: &str, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let key = Key::from_urlsafe(urlsafe)?;
    let info = KeyInfo::from(&key);
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&info)?),
        _ => {
            println!("Key: {key}");
            println!("Kind: {}", info.kind);
            if let Some(id) = key.id() {
                println!("Id: {id}");
            }
            if !info.app.is_empty() {
                println!("App: {}", info.app);
            }
            if !info.namespace.is_empty() {
                println!("Namespace: {}", info.namespace);
            }
            if let Some(parent) = key.parent() {
                println!("Parent: {}", parent.urlsafe());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairs_parse_numeric_and_named_ids() {
        assert_eq!(
            parse_pair("Message:123").unwrap(),
            ("Message".to_string(), KeyId::Int(123))
        );
        assert_eq!(
            parse_pair("Account:sandy@foo.com").unwrap(),
            ("Account".to_string(), KeyId::Name("sandy@foo.com".into()))
        );
        assert!(parse_pair("Account").is_err());
    }

    #[test]
    fn key_info_lists_path() {
        let key = Key::from_pairs([
            ("Account", KeyId::from("sandy@foo.com")),
            ("Message", KeyId::from(123)),
        ])
        .unwrap();
        let info = KeyInfo::from(&key);
        assert_eq!(info.kind, "Message");
        assert_eq!(info.path[1], ("Message".to_string(), "123".to_string()));
        assert_eq!(Key::from_urlsafe(&info.urlsafe).unwrap(), key);
    }
}
