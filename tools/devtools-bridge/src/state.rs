//! Host state container contract and the closed set of mutation operators the
//! replay engine can re-apply.
//!
//! A recorded mutation is a `(method, args)` pair. [`MutationOperator::from_call`]
//! decodes it into a typed operator; [`StateContainer::apply`] runs it. The
//! argument layout follows the host model: the first argument is always the
//! path, given either as an array of keys or as a dotted string.

use crate::errors::BridgeError;
use serde_json::{Map, Number, Value};
use std::fmt;

/// Location inside the state tree. An empty path addresses the root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatePath(Vec<String>);

impl StatePath {
    pub fn parse(dotted: &str) -> Self {
        Self(
            dotted
                .split('.')
                .filter(|segment| !segment.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    pub fn from_value(value: &Value) -> Result<Self, BridgeError> {
        match value {
            Value::String(dotted) => Ok(Self::parse(dotted)),
            Value::Array(items) => items
                .iter()
                .map(|item| match item {
                    Value::String(key) => Ok(key.clone()),
                    Value::Number(index) => Ok(index.to_string()),
                    other => Err(BridgeError::Mutation(format!(
                        "path segment must be a string or number, got {other}"
                    ))),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Self),
            other => Err(BridgeError::Mutation(format!(
                "path must be a string or array, got {other}"
            ))),
        }
    }

    pub fn keys(&self) -> &[String] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    fn split_last(&self) -> Option<(&[String], &str)> {
        self.0
            .split_last()
            .map(|(last, parent)| (parent, last.as_str()))
    }
}

impl fmt::Display for StatePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MutationOperator {
    Set { path: StatePath, value: Value },
    Unset { path: StatePath },
    Push { path: StatePath, value: Value },
    Merge { path: StatePath, objects: Vec<Map<String, Value>> },
    Pop { path: StatePath },
    Shift { path: StatePath },
    Unshift { path: StatePath, value: Value },
    Splice {
        path: StatePath,
        start: i64,
        delete_count: Option<usize>,
        items: Vec<Value>,
    },
    Concat { path: StatePath, value: Value },
    Increment { path: StatePath, delta: Number },
    Toggle { path: StatePath },
}

impl MutationOperator {
    pub fn from_call(method: &str, args: &[Value]) -> Result<Self, BridgeError> {
        check_arity(method, args.len())?;
        let path = StatePath::from_value(args.first().ok_or_else(|| {
            BridgeError::Mutation(format!("{method}: missing path argument"))
        })?)?;
        let value_at = |index: usize| -> Result<Value, BridgeError> {
            args.get(index).cloned().ok_or_else(|| {
                BridgeError::Mutation(format!("{method}: missing argument {index}"))
            })
        };

        let operator = match method {
            "set" => Self::Set {
                path,
                value: value_at(1)?,
            },
            "unset" => Self::Unset { path },
            "push" => Self::Push {
                path,
                value: value_at(1)?,
            },
            "merge" => {
                let objects = args[1..]
                    .iter()
                    .map(|arg| match arg {
                        Value::Object(map) => Ok(map.clone()),
                        other => Err(BridgeError::Mutation(format!(
                            "merge: expected object, got {other}"
                        ))),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Self::Merge { path, objects }
            }
            "pop" => Self::Pop { path },
            "shift" => Self::Shift { path },
            "unshift" => Self::Unshift {
                path,
                value: value_at(1)?,
            },
            "splice" => {
                let start = value_at(1)?.as_i64().ok_or_else(|| {
                    BridgeError::Mutation("splice: start must be an integer".to_string())
                })?;
                let delete_count = match args.get(2) {
                    None | Some(Value::Null) => None,
                    Some(count) => Some(count.as_u64().ok_or_else(|| {
                        BridgeError::Mutation(
                            "splice: delete count must be a non-negative integer".to_string(),
                        )
                    })? as usize),
                };
                Self::Splice {
                    path,
                    start,
                    delete_count,
                    items: args.get(3..).map(<[Value]>::to_vec).unwrap_or_default(),
                }
            }
            "concat" => Self::Concat {
                path,
                value: value_at(1)?,
            },
            "increment" => {
                let delta = match args.get(1) {
                    None => Number::from(1),
                    Some(Value::Number(n)) => n.clone(),
                    Some(other) => {
                        return Err(BridgeError::Mutation(format!(
                            "increment: delta must be a number, got {other}"
                        )))
                    }
                };
                Self::Increment { path, delta }
            }
            "toggle" => Self::Toggle { path },
            other => {
                return Err(BridgeError::Mutation(format!(
                    "unknown mutation method `{other}`"
                )))
            }
        };
        Ok(operator)
    }

    pub fn method(&self) -> &'static str {
        match self {
            Self::Set { .. } => "set",
            Self::Unset { .. } => "unset",
            Self::Push { .. } => "push",
            Self::Merge { .. } => "merge",
            Self::Pop { .. } => "pop",
            Self::Shift { .. } => "shift",
            Self::Unshift { .. } => "unshift",
            Self::Splice { .. } => "splice",
            Self::Concat { .. } => "concat",
            Self::Increment { .. } => "increment",
            Self::Toggle { .. } => "toggle",
        }
    }

    pub fn path(&self) -> &StatePath {
        match self {
            Self::Set { path, .. }
            | Self::Unset { path }
            | Self::Push { path, .. }
            | Self::Merge { path, .. }
            | Self::Pop { path }
            | Self::Shift { path }
            | Self::Unshift { path, .. }
            | Self::Splice { path, .. }
            | Self::Concat { path, .. }
            | Self::Increment { path, .. }
            | Self::Toggle { path } => path,
        }
    }
}

/// Accepted argument counts per method, path included. `None` means no upper
/// bound.
fn arity(method: &str) -> Option<(usize, Option<usize>)> {
    match method {
        "unset" | "pop" | "shift" | "toggle" => Some((1, Some(1))),
        "set" | "push" | "unshift" | "concat" => Some((2, Some(2))),
        "increment" => Some((1, Some(2))),
        "merge" | "splice" => Some((2, None)),
        _ => None,
    }
}

fn check_arity(method: &str, given: usize) -> Result<(), BridgeError> {
    let Some((min, max)) = arity(method) else {
        return Err(BridgeError::Mutation(format!(
            "unknown mutation method `{method}`"
        )));
    };
    if given < min || max.is_some_and(|max| given > max) {
        let expected = match max {
            Some(max) if max == min => format!("{min}"),
            Some(max) => format!("{min} to {max}"),
            None => format!("at least {min}"),
        };
        return Err(BridgeError::Mutation(format!(
            "{method}: expected {expected} argument(s), got {given}"
        )));
    }
    Ok(())
}

/// The host's mutable state. `set` overwrites the whole tree.
pub trait StateContainer {
    fn get(&self) -> Value;
    fn set(&mut self, state: Value);
    fn apply(&mut self, operator: &MutationOperator) -> Result<(), BridgeError>;
}

/// State container backed by a single `serde_json::Value` tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JsonModel {
    state: Value,
}

impl JsonModel {
    pub fn new(state: Value) -> Self {
        Self { state }
    }

    pub fn get_path(&self, dotted: &str) -> Option<&Value> {
        StatePath::parse(dotted)
            .keys()
            .iter()
            .try_fold(&self.state, |current, key| match current {
                Value::Object(map) => map.get(key),
                Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => None,
            })
    }
}

impl StateContainer for JsonModel {
    fn get(&self) -> Value {
        self.state.clone()
    }

    fn set(&mut self, state: Value) {
        self.state = state;
    }

    fn apply(&mut self, operator: &MutationOperator) -> Result<(), BridgeError> {
        apply_operator(&mut self.state, operator)
    }
}

/// Apply one operator to a JSON tree. Exposed so hosts with their own
/// container can reuse the operator semantics.
pub fn apply_operator(root: &mut Value, operator: &MutationOperator) -> Result<(), BridgeError> {
    use MutationOperator as Op;

    match operator {
        Op::Set { path, value } => set_at(root, path, value.clone()),
        Op::Unset { path } => unset_at(root, path),
        Op::Push { path, value } => {
            array_at(root, path, operator.method())?.push(value.clone());
            Ok(())
        }
        Op::Merge { path, objects } => {
            let target = walk_mut(root, path.keys(), true)?;
            if target.is_null() {
                *target = Value::Object(Map::new());
            }
            let Value::Object(map) = target else {
                return Err(type_mismatch("merge", path, "object"));
            };
            for object in objects {
                for (key, value) in object {
                    map.insert(key.clone(), value.clone());
                }
            }
            Ok(())
        }
        Op::Pop { path } => {
            array_at(root, path, operator.method())?.pop();
            Ok(())
        }
        Op::Shift { path } => {
            let items = array_at(root, path, operator.method())?;
            if !items.is_empty() {
                items.remove(0);
            }
            Ok(())
        }
        Op::Unshift { path, value } => {
            array_at(root, path, operator.method())?.insert(0, value.clone());
            Ok(())
        }
        Op::Splice {
            path,
            start,
            delete_count,
            items,
        } => {
            let array = array_at(root, path, operator.method())?;
            let len = array.len() as i64;
            let from = (if *start < 0 {
                (len + start).max(0)
            } else {
                (*start).min(len)
            }) as usize;
            let count = delete_count
                .unwrap_or(array.len() - from)
                .min(array.len() - from);
            array.splice(from..from + count, items.iter().cloned());
            Ok(())
        }
        Op::Concat { path, value } => {
            let array = array_at(root, path, operator.method())?;
            match value {
                Value::Array(more) => array.extend(more.iter().cloned()),
                other => array.push(other.clone()),
            }
            Ok(())
        }
        Op::Increment { path, delta } => {
            let target = walk_mut(root, path.keys(), false)?;
            let Value::Number(current) = target else {
                return Err(type_mismatch("increment", path, "number"));
            };
            let next = add_numbers(current, delta)?;
            *target = Value::Number(next);
            Ok(())
        }
        Op::Toggle { path } => {
            let target = walk_mut(root, path.keys(), false)?;
            let Value::Bool(flag) = target else {
                return Err(type_mismatch("toggle", path, "boolean"));
            };
            *flag = !*flag;
            Ok(())
        }
    }
}

fn set_at(root: &mut Value, path: &StatePath, value: Value) -> Result<(), BridgeError> {
    let Some((parent_keys, key)) = path.split_last() else {
        *root = value;
        return Ok(());
    };
    let parent = walk_mut(root, parent_keys, true)?;
    if parent.is_null() {
        *parent = Value::Object(Map::new());
    }
    match parent {
        Value::Object(map) => {
            map.insert(key.to_string(), value);
            Ok(())
        }
        Value::Array(items) => {
            let index = parse_index(key, path)?;
            if index < items.len() {
                items[index] = value;
            } else if index == items.len() {
                items.push(value);
            } else {
                return Err(BridgeError::Mutation(format!(
                    "set: index {index} out of bounds at `{path}`"
                )));
            }
            Ok(())
        }
        _ => Err(type_mismatch("set", path, "object or array parent")),
    }
}

fn unset_at(root: &mut Value, path: &StatePath) -> Result<(), BridgeError> {
    let Some((parent_keys, key)) = path.split_last() else {
        *root = Value::Null;
        return Ok(());
    };
    match walk_mut(root, parent_keys, false)? {
        Value::Object(map) => {
            map.remove(key);
            Ok(())
        }
        Value::Array(items) => {
            let index = parse_index(key, path)?;
            if index < items.len() {
                items.remove(index);
            }
            Ok(())
        }
        _ => Err(type_mismatch("unset", path, "object or array parent")),
    }
}

fn array_at<'a>(
    root: &'a mut Value,
    path: &StatePath,
    method: &str,
) -> Result<&'a mut Vec<Value>, BridgeError> {
    match walk_mut(root, path.keys(), false)? {
        Value::Array(items) => Ok(items),
        _ => Err(type_mismatch(method, path, "array")),
    }
}

fn walk_mut<'a>(
    root: &'a mut Value,
    keys: &[String],
    create: bool,
) -> Result<&'a mut Value, BridgeError> {
    let mut current = root;
    for key in keys {
        if create && current.is_null() {
            *current = Value::Object(Map::new());
        }
        current = match current {
            Value::Object(map) => {
                if create {
                    map.entry(key.clone())
                        .or_insert_with(|| Value::Object(Map::new()))
                } else {
                    map.get_mut(key)
                        .ok_or_else(|| BridgeError::Mutation(format!("missing key `{key}`")))?
                }
            }
            Value::Array(items) => {
                let index = key.parse::<usize>().map_err(|_| {
                    BridgeError::Mutation(format!("`{key}` is not an array index"))
                })?;
                items
                    .get_mut(index)
                    .ok_or_else(|| BridgeError::Mutation(format!("index {index} out of bounds")))?
            }
            _ => {
                return Err(BridgeError::Mutation(format!(
                    "cannot descend into scalar at `{key}`"
                )))
            }
        };
    }
    Ok(current)
}

fn parse_index(key: &str, path: &StatePath) -> Result<usize, BridgeError> {
    key.parse::<usize>()
        .map_err(|_| BridgeError::Mutation(format!("`{key}` is not an array index in `{path}`")))
}

fn add_numbers(current: &Number, delta: &Number) -> Result<Number, BridgeError> {
    if let (Some(a), Some(b)) = (current.as_i64(), delta.as_i64()) {
        if let Some(sum) = a.checked_add(b) {
            return Ok(Number::from(sum));
        }
    }
    let sum = current.as_f64().unwrap_or(0.0) + delta.as_f64().unwrap_or(0.0);
    Number::from_f64(sum)
        .ok_or_else(|| BridgeError::Mutation("increment produced a non-finite number".to_string()))
}

fn type_mismatch(method: &str, path: &StatePath, expected: &str) -> BridgeError {
    BridgeError::Mutation(format!("{method}: expected {expected} at `{path}`"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn op(method: &str, args: Value) -> MutationOperator {
        let Value::Array(args) = args else {
            panic!("args must be an array");
        };
        MutationOperator::from_call(method, &args).expect("decode operator")
    }

    #[test]
    fn paths_accept_arrays_and_dotted_strings() {
        assert_eq!(
            StatePath::from_value(&json!(["user", "name"])).expect("array path"),
            StatePath::parse("user.name")
        );
        assert_eq!(
            StatePath::from_value(&json!(["items", 0])).expect("numeric segment"),
            StatePath::parse("items.0")
        );
        assert!(StatePath::from_value(&json!("")).expect("root").is_root());
        assert!(StatePath::from_value(&json!(true)).is_err());
    }

    #[test]
    fn unknown_method_is_rejected() {
        let err = MutationOperator::from_call("explode", &[json!(["a"])]).expect_err("unknown");
        assert!(err.to_string().contains("unknown mutation method"));
    }

    #[test]
    fn set_creates_intermediate_objects() {
        let mut model = JsonModel::new(json!({}));
        model
            .apply(&op("set", json!([["user", "profile", "name"], "ada"])))
            .expect("set");
        assert_eq!(model.get(), json!({"user": {"profile": {"name": "ada"}}}));
    }

    #[test]
    fn array_operators_follow_host_semantics() {
        let mut model = JsonModel::new(json!({"list": [1, 2, 3]}));
        model.apply(&op("push", json!(["list", 4]))).expect("push");
        model.apply(&op("shift", json!(["list"]))).expect("shift");
        model.apply(&op("unshift", json!(["list", 0]))).expect("unshift");
        model.apply(&op("pop", json!(["list"]))).expect("pop");
        assert_eq!(model.get_path("list"), Some(&json!([0, 2, 3])));

        model
            .apply(&op("splice", json!(["list", -2, 1, "a", "b"])))
            .expect("splice");
        assert_eq!(model.get_path("list"), Some(&json!([0, "a", "b", 3])));

        model.apply(&op("concat", json!(["list", [9, 10]]))).expect("concat");
        assert_eq!(model.get_path("list.5"), Some(&json!(10)));
    }

    #[test]
    fn splice_without_count_removes_tail() {
        let mut model = JsonModel::new(json!({"list": [1, 2, 3, 4]}));
        model.apply(&op("splice", json!(["list", 1]))).expect("splice");
        assert_eq!(model.get_path("list"), Some(&json!([1])));
    }

    #[test]
    fn merge_unset_increment_and_toggle() {
        let mut model = JsonModel::new(json!({"count": 1, "open": false}));
        model
            .apply(&op("merge", json!(["settings", {"a": 1}, {"b": 2}])))
            .expect("merge");
        model.apply(&op("increment", json!(["count"]))).expect("inc");
        model.apply(&op("increment", json!(["count", 0.5]))).expect("inc");
        model.apply(&op("toggle", json!(["open"]))).expect("toggle");
        model.apply(&op("unset", json!([["settings", "a"]]))).expect("unset");
        assert_eq!(
            model.get(),
            json!({"count": 2.5, "open": true, "settings": {"b": 2}})
        );
    }

    #[test]
    fn wrong_argument_counts_are_rejected() {
        for (method, args) in [
            ("unset", json!(["settings", "a"])),
            ("toggle", json!(["open", true])),
            ("pop", json!(["list", 1])),
            ("shift", json!(["list", 1])),
            ("set", json!(["count"])),
            ("set", json!(["count", 1, 2])),
            ("increment", json!(["count", 1, 2])),
            ("merge", json!(["settings"])),
            ("push", json!([])),
        ] {
            let Value::Array(args) = args else {
                panic!("args must be an array");
            };
            let err = MutationOperator::from_call(method, &args)
                .expect_err(&format!("{method} with {} args", args.len()));
            assert!(
                err.to_string().contains("argument"),
                "{method}: unexpected error {err}"
            );
        }
    }

    #[test]
    fn nested_paths_walk_existing_containers() {
        let mut model = JsonModel::new(json!({"ui": {"panels": [{"open": false, "hits": 1}]}}));
        model
            .apply(&op("toggle", json!([["ui", "panels", 0, "open"]])))
            .expect("toggle");
        model
            .apply(&op("increment", json!(["ui.panels.0.hits", 2])))
            .expect("increment");
        model
            .apply(&op("merge", json!([["ui", "theme"], {"dark": true}])))
            .expect("merge creates");
        assert_eq!(
            model.get(),
            json!({"ui": {"panels": [{"open": true, "hits": 3}], "theme": {"dark": true}}})
        );

        let err = model
            .apply(&op("toggle", json!([["ui", "missing", "open"]])))
            .expect_err("missing key");
        assert!(err.to_string().contains("missing key `missing`"));
    }

    #[test]
    fn unset_on_nested_path_keeps_siblings() {
        let mut model = JsonModel::new(json!({"settings": {"a": 1, "b": 2}}));
        model.apply(&op("unset", json!(["settings.a"]))).expect("unset");
        assert_eq!(model.get(), json!({"settings": {"b": 2}}));
    }

    #[test]
    fn type_mismatches_are_reported_not_panicked() {
        let mut model = JsonModel::new(json!({"count": 1}));
        let err = model.apply(&op("push", json!(["count", 2]))).expect_err("not array");
        assert!(err.to_string().contains("expected array at `count`"));
        assert!(model.apply(&op("toggle", json!(["missing"]))).is_err());
    }

    #[test]
    fn set_on_root_replaces_everything() {
        let mut model = JsonModel::new(json!({"a": 1}));
        model.apply(&op("set", json!([[], {"b": 2}]))).expect("root set");
        assert_eq!(model.get(), json!({"b": 2}));
    }
}
