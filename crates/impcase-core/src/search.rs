//! Topic search by id, name, and alias

use impress_frames::{Handle, Value};

use crate::document::CaseDocument;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Match {
    None,
    Partial,
    Full,
}

impl CaseDocument {
    /// Search topics by name and alias, case-insensitively.
    ///
    /// A topic whose id equals the query is returned alone. Otherwise prefix
    /// matches come before substring matches, each in collection order. With
    /// `exact_only`, a name or alias must equal the query. Searches `subset`
    /// when given, else the active topic set.
    pub fn search(&self, query: &str, exact_only: bool, subset: Option<&[Handle]>) -> Vec<Handle> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return Vec::new();
        }
        let topics = subset.unwrap_or(&self.topics);

        if let Some(&hit) = topics
            .iter()
            .find(|&&t| self.id_of(t).eq_ignore_ascii_case(&query))
        {
            return vec![hit];
        }

        let mut results = Vec::new();
        let mut partial = Vec::new();
        for &topic in topics {
            match self.match_topic(topic, &query, exact_only) {
                Match::Full => results.push(topic),
                Match::Partial => partial.push(topic),
                Match::None => {}
            }
        }
        results.extend(partial);
        results
    }

    fn match_topic(&self, topic: Handle, query: &str, exact_only: bool) -> Match {
        let names = self.names();
        let mut best = Match::None;
        for slot in self.store().slots(topic) {
            if slot.key != names.name && slot.key != names.alias {
                continue;
            }
            let Some(text) = slot.value.as_str() else {
                continue;
            };
            let normalized = text.to_lowercase();
            if exact_only {
                if normalized == query {
                    return Match::Full;
                }
            } else if normalized.starts_with(query) {
                return Match::Full;
            } else if normalized.contains(query) {
                best = Match::Partial;
            }
        }
        best
    }

    /// Search and cap the number of results. A limit of 0 means unlimited.
    pub fn search_limited(
        &self,
        query: &str,
        exact_only: bool,
        subset: Option<&[Handle]>,
        limit: usize,
    ) -> Vec<Handle> {
        let mut results = self.search(query, exact_only, subset);
        if limit > 0 {
            results.truncate(limit);
        }
        results
    }
}

/// Display names of `topics`, for result lists.
pub fn display_names(doc: &CaseDocument, topics: &[Handle]) -> Vec<String> {
    topics
        .iter()
        .map(|&t| {
            doc.store()
                .get(t, doc.names().name)
                .and_then(Value::as_str)
                .unwrap_or_else(|| doc.id_of(t))
                .to_string()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topic::TopicSeed;
    use rstest::rstest;

    fn case() -> CaseDocument {
        let mut doc = CaseDocument::new(2, "Case");
        doc.new_topic(TopicSeed::named("Grace Hopper")).unwrap();
        doc.new_topic(TopicSeed::named("Hopper Island")).unwrap();
        let t = doc.new_topic(TopicSeed::named("Amazing Grace")).unwrap();
        doc.edit_topic(t, |store, names, t| store.add(t, names.alias, "Hymn"))
            .unwrap();
        doc.new_topic(TopicSeed::named("Ada")).unwrap();
        doc
    }

    #[rstest]
    #[case("grace", false, vec!["Grace Hopper", "Amazing Grace"])]
    #[case("HOPPER", false, vec!["Hopper Island", "Grace Hopper"])]
    #[case("hymn", false, vec!["Amazing Grace"])]
    #[case("grace", true, vec![])]
    #[case("ada", true, vec!["Ada"])]
    #[case("t/2/4", false, vec!["Ada"])]
    #[case("", false, vec![])]
    fn test_search(#[case] query: &str, #[case] exact: bool, #[case] expected: Vec<&str>) {
        let doc = case();
        let results = doc.search(query, exact, None);
        assert_eq!(display_names(&doc, &results), expected);
    }

    #[test]
    fn test_search_subset_and_limit() {
        let doc = case();
        let subset = &doc.topics()[2..3];
        assert_eq!(doc.search("grace", false, Some(subset)).len(), 0);
        assert_eq!(doc.search_limited("grace", false, None, 1).len(), 1);
    }
}
