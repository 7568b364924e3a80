/// Walks a parsed YAML tree and substitutes `ENV:NAME[:default]` markers
/// in string scalars from the process environment (spec.md §6, S5).
///
/// `lookup` is injected so tests don't depend on process-wide env state
/// beyond what they themselves set.
pub(crate) fn substitute(value: &mut serde_yaml::Value, lookup: &dyn Fn(&str) -> Result<String, std::env::VarError>) {
    match value {
        serde_yaml::Value::String(s) => {
            if let Some(resolved) = resolve(s, lookup) {
                *s = resolved;
            }
        }
        serde_yaml::Value::Sequence(seq) => {
            for item in seq {
                substitute(item, lookup);
            }
        }
        serde_yaml::Value::Mapping(map) => {
            for (_, v) in map.iter_mut() {
                substitute(v, lookup);
            }
        }
        _ => {}
    }
}

fn resolve(raw: &str, lookup: &dyn Fn(&str) -> Result<String, std::env::VarError>) -> Option<String> {
    let rest = raw.strip_prefix("ENV:")?;
    let (name, default) = match rest.split_once(':') {
        Some((name, default)) => (name, Some(default)),
        None => (rest, None),
    };
    match lookup(name) {
        Ok(value) => Some(value),
        Err(_) => default.map(|d| d.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(present: &[(&str, &str)]) -> impl Fn(&str) -> Result<String, std::env::VarError> + '_ {
        move |name: &str| {
            present
                .iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| v.to_string())
                .ok_or(std::env::VarError::NotPresent)
        }
    }

    #[test]
    fn substitutes_present_variable() {
        let mut v = serde_yaml::Value::String("ENV:FOO:fallback".to_string());
        substitute(&mut v, &env(&[("FOO", "bar")]));
        assert_eq!(v, serde_yaml::Value::String("bar".to_string()));
    }

    #[test]
    fn falls_back_when_unset() {
        let mut v = serde_yaml::Value::String("ENV:FOO:fallback".to_string());
        substitute(&mut v, &env(&[]));
        assert_eq!(v, serde_yaml::Value::String("fallback".to_string()));
    }

    #[test]
    fn no_default_and_unset_leaves_value_absent_as_empty() {
        let mut v = serde_yaml::Value::String("ENV:FOO".to_string());
        substitute(&mut v, &env(&[]));
        // No default and unset: resolve() returns None, value left untouched upstream
        // handling is the caller's choice; here substitute() leaves the original marker.
        assert_eq!(v, serde_yaml::Value::String("ENV:FOO".to_string()));
    }

    #[test]
    fn non_marker_strings_are_untouched() {
        let mut v = serde_yaml::Value::String("plain-value".to_string());
        substitute(&mut v, &env(&[("FOO", "bar")]));
        assert_eq!(v, serde_yaml::Value::String("plain-value".to_string()));
    }

    #[test]
    fn recurses_into_nested_structures() {
        let mut map = serde_yaml::Mapping::new();
        map.insert("a".into(), serde_yaml::Value::String("ENV:FOO:x".into()));
        let mut v = serde_yaml::Value::Mapping(map);
        substitute(&mut v, &env(&[("FOO", "resolved")]));
        assert_eq!(v["a"], serde_yaml::Value::String("resolved".to_string()));
    }
}
