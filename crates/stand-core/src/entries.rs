//! Maps with composite keys serialize as `[key, value]` pairs; JSON object
//! keys must be strings.

use std::collections::BTreeMap;

use serde::{Serialize, Serializer};

pub(crate) fn serialize<K, V, S>(map: &BTreeMap<K, V>, serializer: S) -> Result<S::Ok, S::Error>
where
    K: Serialize,
    V: Serialize,
    S: Serializer,
{
    serializer.collect_seq(map.iter())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Keyed {
        #[serde(serialize_with = "serialize")]
        map: BTreeMap<(u16, String), f64>,
    }

    #[test]
    fn tuple_keys_become_pairs() {
        let mut map = BTreeMap::new();
        map.insert((1990, "psme".to_string()), 0.5);
        let json = serde_json::to_string(&Keyed { map }).unwrap();
        assert_eq!(json, r#"{"map":[[[1990,"psme"],0.5]]}"#);
    }
}
