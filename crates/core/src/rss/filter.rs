//! Title filtering and the seen-item window.

use std::collections::{HashSet, VecDeque};

use regex_lite::{Regex, RegexBuilder};

use super::types::{FeedFilter, RssError};
use crate::fleet::MAX_PRIORITY;

/// How filters combine when deciding acquisition.
#[derive(Debug, Clone)]
pub struct FilterPolicy {
    /// A feed without inclusion filters accepts anything not excluded.
    pub accept_when_no_filters: bool,
    pub case_sensitive: bool,
    /// Priority for items accepted without an inclusion filter.
    pub default_priority: u8,
}

enum Matcher {
    Substring(String),
    Regex(Regex),
}

pub(crate) struct CompiledFilter {
    filter: FeedFilter,
    matcher: Matcher,
    case_sensitive: bool,
}

impl CompiledFilter {
    pub(crate) fn compile(filter: &FeedFilter, case_sensitive: bool) -> Result<Self, RssError> {
        if filter.priority > MAX_PRIORITY {
            return Err(RssError::InvalidFilter(format!(
                "priority {} out of range 0-{}",
                filter.priority, MAX_PRIORITY
            )));
        }
        if filter.pattern.is_empty() {
            return Err(RssError::InvalidFilter("empty pattern".to_string()));
        }

        let matcher = if filter.regex {
            let regex = RegexBuilder::new(&filter.pattern)
                .case_insensitive(!case_sensitive)
                .build()
                .map_err(|e| RssError::InvalidFilter(format!("{}: {}", filter.pattern, e)))?;
            Matcher::Regex(regex)
        } else if case_sensitive {
            Matcher::Substring(filter.pattern.clone())
        } else {
            Matcher::Substring(filter.pattern.to_lowercase())
        };

        Ok(Self {
            filter: filter.clone(),
            matcher,
            case_sensitive,
        })
    }

    pub(crate) fn filter(&self) -> &FeedFilter {
        &self.filter
    }

    fn matches(&self, title: &str) -> bool {
        match &self.matcher {
            Matcher::Regex(regex) => regex.is_match(title),
            Matcher::Substring(needle) if self.case_sensitive => title.contains(needle.as_str()),
            Matcher::Substring(needle) => title.to_lowercase().contains(needle.as_str()),
        }
    }
}

impl FilterPolicy {
    /// Priority to acquire `title` with, or `None` if it is not acquired.
    ///
    /// Any matching exclusion vetoes; otherwise the first matching inclusion
    /// filter decides.
    pub(crate) fn evaluate(&self, filters: &[CompiledFilter], title: &str) -> Option<u8> {
        if filters
            .iter()
            .any(|f| f.filter.exclude && f.matches(title))
        {
            return None;
        }

        let mut inclusions = filters.iter().filter(|f| !f.filter.exclude).peekable();
        if inclusions.peek().is_none() {
            return self.accept_when_no_filters.then_some(self.default_priority);
        }
        inclusions
            .find(|f| f.matches(title))
            .map(|f| f.filter.priority)
    }
}

/// Bounded FIFO set of item keys.
#[derive(Debug)]
pub(crate) struct SeenItems {
    capacity: usize,
    order: VecDeque<String>,
    keys: HashSet<String>,
}

impl SeenItems {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order: VecDeque::new(),
            keys: HashSet::new(),
        }
    }

    pub(crate) fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    /// Record a key, evicting the oldest beyond capacity.
    pub(crate) fn insert(&mut self, key: &str) {
        if !self.keys.insert(key.to_string()) {
            return;
        }
        self.order.push_back(key.to_string());
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.keys.remove(&oldest);
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.order.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> FilterPolicy {
        FilterPolicy {
            accept_when_no_filters: true,
            case_sensitive: false,
            default_priority: 5,
        }
    }

    fn compile(filters: &[FeedFilter]) -> Vec<CompiledFilter> {
        filters
            .iter()
            .map(|f| CompiledFilter::compile(f, false).unwrap())
            .collect()
    }

    #[test]
    fn test_include_and_exclude() {
        let filters = compile(&[FeedFilter::include("Ubuntu", 6), FeedFilter::exclude("beta")]);
        let policy = policy();

        assert_eq!(policy.evaluate(&filters, "Ubuntu 24.04"), Some(6));
        assert_eq!(policy.evaluate(&filters, "Ubuntu 24.04 beta"), None);
        assert_eq!(policy.evaluate(&filters, "ubuntu 24.04 BETA"), None);
        assert_eq!(policy.evaluate(&filters, "Debian 12"), None);
    }

    #[test]
    fn test_first_inclusion_sets_priority() {
        let filters = compile(&[FeedFilter::include("1080p", 7), FeedFilter::include("ubuntu", 2)]);
        assert_eq!(policy().evaluate(&filters, "Ubuntu 1080p"), Some(7));
        assert_eq!(policy().evaluate(&filters, "Ubuntu 720p"), Some(2));
    }

    #[test]
    fn test_no_inclusion_filters_policy() {
        let filters = compile(&[FeedFilter::exclude("beta")]);
        assert_eq!(policy().evaluate(&filters, "anything"), Some(5));
        assert_eq!(policy().evaluate(&filters, "a beta"), None);

        let strict = FilterPolicy {
            accept_when_no_filters: false,
            ..policy()
        };
        assert_eq!(strict.evaluate(&filters, "anything"), None);
        assert_eq!(strict.evaluate(&[], "anything"), None);
    }

    #[test]
    fn test_regex_filter() {
        let filter = FeedFilter {
            pattern: r"^ubuntu \d+\.\d+$".to_string(),
            regex: true,
            priority: 4,
            exclude: false,
        };
        let filters = compile(&[filter]);
        assert_eq!(policy().evaluate(&filters, "Ubuntu 24.04"), Some(4));
        assert_eq!(policy().evaluate(&filters, "Ubuntu 24.04 beta"), None);
    }

    #[test]
    fn test_case_sensitive_substring() {
        let filter = CompiledFilter::compile(&FeedFilter::include("Ubuntu", 5), true).unwrap();
        let policy = FilterPolicy {
            case_sensitive: true,
            ..policy()
        };
        assert_eq!(policy.evaluate(std::slice::from_ref(&filter), "Ubuntu"), Some(5));
        assert_eq!(policy.evaluate(std::slice::from_ref(&filter), "ubuntu"), None);
    }

    #[test]
    fn test_invalid_filters_rejected() {
        let bad_regex = FeedFilter {
            pattern: "(".to_string(),
            regex: true,
            priority: 5,
            exclude: false,
        };
        assert!(CompiledFilter::compile(&bad_regex, false).is_err());
        assert!(CompiledFilter::compile(&FeedFilter::include("x", 8), false).is_err());
        assert!(CompiledFilter::compile(&FeedFilter::include("", 1), false).is_err());
    }

    #[test]
    fn test_seen_items_bounded() {
        let mut seen = SeenItems::new(2);
        seen.insert("a");
        seen.insert("b");
        seen.insert("a");
        assert_eq!(seen.len(), 2);

        seen.insert("c");
        assert!(!seen.contains("a"));
        assert!(seen.contains("b"));
        assert!(seen.contains("c"));
    }
}
