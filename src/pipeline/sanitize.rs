//! 请求净化：移除可能被数据库解释为查询操作符的键
//!
//! 以 `$` 开头或包含字段路径分隔符 `.` 的键在任意深度都会被删除，
//! 其余数据原样保留并保持顺序。

use serde_json::{Map, Number, Value};
use url::form_urlencoded;

/// 操作符前缀
pub const OPERATOR_SENTINEL: char = '$';
/// 字段路径分隔符
pub const PATH_SEPARATOR: char = '.';

/// 标量值
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Number(Number),
    Text(String),
}

/// 与序列化格式无关的请求数据树
#[derive(Debug, Clone, PartialEq)]
pub enum RequestValue {
    Scalar(Scalar),
    Sequence(Vec<RequestValue>),
    /// 有序键值对
    Mapping(Vec<(String, RequestValue)>),
}

impl From<Value> for RequestValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => RequestValue::Scalar(Scalar::Null),
            Value::Bool(b) => RequestValue::Scalar(Scalar::Bool(b)),
            Value::Number(n) => RequestValue::Scalar(Scalar::Number(n)),
            Value::String(s) => RequestValue::Scalar(Scalar::Text(s)),
            Value::Array(items) => {
                RequestValue::Sequence(items.into_iter().map(RequestValue::from).collect())
            }
            Value::Object(map) => RequestValue::Mapping(
                map.into_iter().map(|(k, v)| (k, RequestValue::from(v))).collect(),
            ),
        }
    }
}

impl From<RequestValue> for Value {
    fn from(value: RequestValue) -> Self {
        match value {
            RequestValue::Scalar(Scalar::Null) => Value::Null,
            RequestValue::Scalar(Scalar::Bool(b)) => Value::Bool(b),
            RequestValue::Scalar(Scalar::Number(n)) => Value::Number(n),
            RequestValue::Scalar(Scalar::Text(s)) => Value::String(s),
            RequestValue::Sequence(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            RequestValue::Mapping(entries) => {
                let mut map = Map::with_capacity(entries.len());
                for (k, v) in entries {
                    map.insert(k, Value::from(v));
                }
                Value::Object(map)
            }
        }
    }
}

/// 该键是否可能被解释为查询操作符
pub fn is_operator_key(key: &str) -> bool {
    key.starts_with(OPERATOR_SENTINEL) || key.contains(PATH_SEPARATOR)
}

/// 返回净化后的值
pub fn sanitize(mut value: RequestValue) -> RequestValue {
    sanitize_in_place(&mut value);
    value
}

/// 原地净化，返回删除的键数量
pub fn sanitize_in_place(value: &mut RequestValue) -> usize {
    match value {
        RequestValue::Scalar(_) => 0,
        RequestValue::Sequence(items) => items.iter_mut().map(sanitize_in_place).sum(),
        RequestValue::Mapping(entries) => {
            let before = entries.len();
            entries.retain(|(key, _)| !is_operator_key(key));
            let removed = before - entries.len();
            removed
                + entries
                    .iter_mut()
                    .map(|(_, v)| sanitize_in_place(v))
                    .sum::<usize>()
        }
    }
}

/// 净化 JSON 请求体；不是合法 JSON 时返回 `None`，由下游按原样处理
pub fn sanitize_json_body(body: &[u8]) -> Option<(Vec<u8>, usize)> {
    let parsed: Value = serde_json::from_slice(body).ok()?;
    let mut value = RequestValue::from(parsed);
    let removed = sanitize_in_place(&mut value);
    if removed == 0 {
        return Some((body.to_vec(), 0));
    }
    let bytes = serde_json::to_vec(&Value::from(value)).ok()?;
    Some((bytes, removed))
}

/// 净化 URL 查询串
///
/// `a[$gt]=1` 这样的方括号路径按段检查。无需修改时返回 `None`，原串保持不变。
pub fn sanitize_query(raw: &str) -> Option<(String, usize)> {
    let pairs: Vec<(String, String)> = form_urlencoded::parse(raw.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let before = pairs.len();
    let kept: Vec<&(String, String)> = pairs
        .iter()
        .filter(|(key, _)| !query_key_segments(key).any(is_operator_key))
        .collect();
    let removed = before - kept.len();
    if removed == 0 {
        return None;
    }

    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (k, v) in kept {
        serializer.append_pair(k, v);
    }
    Some((serializer.finish(), removed))
}

/// `user[profile][$ne]` -> `user`, `profile`, `$ne`
fn query_key_segments(key: &str) -> impl Iterator<Item = &str> {
    key.split(['[', ']']).filter(|segment| !segment.is_empty())
}
