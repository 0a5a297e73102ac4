//! Record codec between the wire representation (raw JSON fields) and the
//! domain types.
//!
//! Pure functions, no side effects. Decoding fails with
//! `CoreError::MissingField` when a required field is absent or not a JSON
//! string; encoding is total. Round-trip law: `decode(encode(v)) == v` for
//! every valid value.

use serde_json::{json, Map, Value};

use crate::{CoreError, Group, Member};

fn required_str(raw: &Value, field: &'static str) -> Result<String, CoreError> {
    raw.get(field)
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or(CoreError::MissingField(field))
}

/// Decode a member from raw JSON fields.
///
/// All five fields must be present JSON strings. An empty `name` is treated
/// the same as an absent one.
pub fn decode_member(raw: &Value) -> Result<Member, CoreError> {
    let name = required_str(raw, "name")?;
    if name.is_empty() {
        return Err(CoreError::MissingField("name"));
    }
    Ok(Member {
        name,
        region: required_str(raw, "region")?,
        email: required_str(raw, "email")?,
        age: required_str(raw, "age")?,
        group: required_str(raw, "group")?,
    })
}

/// Encode a member as a flat JSON object of its five scalar fields.
pub fn encode_member(member: &Member) -> Value {
    json!({
        "name": member.name,
        "region": member.region,
        "email": member.email,
        "age": member.age,
        "group": member.group,
    })
}

/// Decode a group from raw JSON fields.
///
/// `users` defaults to an empty sequence when absent; each element is
/// decoded via [`decode_member`].
pub fn decode_group(raw: &Value) -> Result<Group, CoreError> {
    let name = required_str(raw, "name")?;
    if name.is_empty() {
        return Err(CoreError::MissingField("name"));
    }
    let region = required_str(raw, "region")?;
    let users = match raw.get("users") {
        Some(Value::Array(items)) => items
            .iter()
            .map(decode_member)
            .collect::<Result<Vec<_>, _>>()?,
        Some(_) => return Err(CoreError::MissingField("users")),
        None => Vec::new(),
    };
    Ok(Group {
        name,
        region,
        users,
    })
}

/// Encode a group as `{name, region, users: [Member, ...]}`.
pub fn encode_group(group: &Group) -> Value {
    let mut obj = Map::new();
    obj.insert("name".into(), Value::String(group.name.clone()));
    obj.insert("region".into(), Value::String(group.region.clone()));
    obj.insert(
        "users".into(),
        Value::Array(group.users.iter().map(encode_member).collect()),
    );
    Value::Object(obj)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> Member {
        Member {
            name: "alice".into(),
            region: "us".into(),
            email: "a@x.com".into(),
            age: "30".into(),
            group: "g1".into(),
        }
    }

    #[test]
    fn member_roundtrip() {
        let m = alice();
        let decoded = decode_member(&encode_member(&m)).unwrap();
        assert_eq!(decoded, m);
    }

    #[test]
    fn group_roundtrip() {
        let g = Group {
            name: "g1".into(),
            region: "us".into(),
            users: vec![alice()],
        };
        let decoded = decode_group(&encode_group(&g)).unwrap();
        assert_eq!(decoded, g);
    }

    #[test]
    fn member_missing_each_field() {
        let full = encode_member(&alice());
        for field in ["name", "region", "email", "age", "group"] {
            let mut raw = full.clone();
            raw.as_object_mut().unwrap().remove(field);
            let err = decode_member(&raw).unwrap_err();
            assert!(
                matches!(err, CoreError::MissingField(f) if f == field),
                "expected MissingField({field}), got {err:?}"
            );
        }
    }

    #[test]
    fn member_rejects_non_string_field() {
        let mut raw = encode_member(&alice());
        raw.as_object_mut()
            .unwrap()
            .insert("age".into(), serde_json::json!(30));
        let err = decode_member(&raw).unwrap_err();
        assert!(matches!(err, CoreError::MissingField("age")));
    }

    #[test]
    fn member_rejects_empty_name() {
        let mut raw = encode_member(&alice());
        raw.as_object_mut()
            .unwrap()
            .insert("name".into(), serde_json::json!(""));
        let err = decode_member(&raw).unwrap_err();
        assert!(matches!(err, CoreError::MissingField("name")));
    }

    #[test]
    fn group_users_defaults_to_empty() {
        let raw = serde_json::json!({"name": "g1", "region": "us"});
        let g = decode_group(&raw).unwrap();
        assert!(g.users.is_empty());
    }

    #[test]
    fn group_decodes_embedded_users() {
        let raw = serde_json::json!({
            "name": "g1",
            "region": "us",
            "users": [encode_member(&alice())],
        });
        let g = decode_group(&raw).unwrap();
        assert_eq!(g.users, vec![alice()]);
    }

    #[test]
    fn group_propagates_bad_embedded_user() {
        let raw = serde_json::json!({
            "name": "g1",
            "region": "us",
            "users": [{"name": "bob"}],
        });
        let err = decode_group(&raw).unwrap_err();
        assert!(matches!(err, CoreError::MissingField(_)));
    }
}
