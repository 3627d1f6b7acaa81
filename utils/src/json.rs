use serde_json::Value;

// Checks that `actual` carries exactly the fields of `expected`, nothing more and nothing less.
// Numbers compare by value and a null field counts as absent.
pub fn is_json_equivalent(expected: &Value, actual: &Value) -> bool {
    json_mismatch(expected, actual).is_none()
}

// Returns the path of the first field where `actual` differs from `expected`.
pub fn json_mismatch(expected: &Value, actual: &Value) -> Option<String> {
    mismatch_at(expected, actual, "")
}

fn mismatch_at(expected: &Value, actual: &Value, path: &str) -> Option<String> {
    match (expected, actual) {
        (Value::Object(exp_map), Value::Object(act_map)) => {
            for (key, exp_val) in exp_map {
                let child_path = format!("{}.{}", path, key);
                match act_map.get(key) {
                    Some(act_val) => {
                        if let Some(p) = mismatch_at(exp_val, act_val, &child_path) {
                            return Some(p);
                        }
                    }
                    None if exp_val.is_null() => {}
                    None => return Some(child_path),
                }
            }
            act_map
                .iter()
                .find(|(key, act_val)| !act_val.is_null() && !exp_map.contains_key(*key))
                .map(|(key, _)| format!("{}.{}", path, key))
        }
        (Value::Array(exp_arr), Value::Array(act_arr)) => {
            if exp_arr.len() != act_arr.len() {
                return Some(format!("{}[]", path));
            }
            exp_arr
                .iter()
                .zip(act_arr.iter())
                .enumerate()
                .find_map(|(i, (e, a))| mismatch_at(e, a, &format!("{}[{}]", path, i)))
        }
        (Value::Number(e), Value::Number(a)) => {
            if e == a || e.as_f64() == a.as_f64() {
                None
            } else {
                Some(path.to_string())
            }
        }
        (e, a) if e == a => None,
        _ => Some(if path.is_empty() { ".".to_string() } else { path.to_string() }),
    }
}
