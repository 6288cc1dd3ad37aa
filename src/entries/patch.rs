use serde::{Deserialize, Deserializer};

/// A field in a partial update: left alone, cleared, or replaced.
///
/// Pair with `#[serde(default)]` so that an absent key becomes `Missing`
/// while an explicit `null` becomes `Null`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Patch<T> {
    Missing,
    Null,
    Value(T),
}

impl<T> Default for Patch<T> {
    fn default() -> Self {
        Patch::Missing
    }
}

impl<T> Patch<T> {
    pub fn is_missing(&self) -> bool {
        matches!(self, Patch::Missing)
    }

    /// Writes the patch into an optional slot; `Missing` keeps the old value.
    pub fn apply(self, slot: &mut Option<T>) {
        match self {
            Patch::Missing => {}
            Patch::Null => *slot = None,
            Patch::Value(v) => *slot = Some(v),
        }
    }
}

impl<'de, T> Deserialize<'de> for Patch<T>
where
    T: Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Option::<T>::deserialize(deserializer)? {
            Some(v) => Patch::Value(v),
            None => Patch::Null,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Body {
        #[serde(default)]
        food: Patch<String>,
    }

    fn parse(json: &str) -> Patch<String> {
        serde_json::from_str::<Body>(json).unwrap().food
    }

    #[test]
    fn distinguishes_absent_null_and_value() {
        assert_eq!(parse("{}"), Patch::Missing);
        assert_eq!(parse(r#"{"food":null}"#), Patch::Null);
        assert_eq!(parse(r#"{"food":"rice"}"#), Patch::Value("rice".to_string()));
    }

    #[test]
    fn apply_respects_tri_state() {
        let mut slot = Some("old".to_string());
        Patch::Missing.apply(&mut slot);
        assert_eq!(slot.as_deref(), Some("old"));

        Patch::Value("new".to_string()).apply(&mut slot);
        assert_eq!(slot.as_deref(), Some("new"));

        Patch::<String>::Null.apply(&mut slot);
        assert_eq!(slot, None);
    }
}
