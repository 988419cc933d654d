use indexmap::IndexSet;

use crate::classify::{classify_line, ClassifiedLine};
use crate::fetch::RawFetchResult;
use crate::source::Source;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
    Block,
    Allow,
}

/// The normalized form of one pipeline's inputs: insertion-ordered sets of
/// plain domains, `||host^` rules and `@@||host^` exceptions, plus the
/// sources that produced nothing. Order is first-sight and only provisional;
/// the writer re-sorts on output.
#[derive(Debug, Default)]
pub struct ListStream {
    pub domains: IndexSet<String>,
    pub rules: IndexSet<String>,
    pub exceptions: IndexSet<String>,
    pub failed: Vec<Source>,
}

impl ListStream {
    pub fn entry_count(&self) -> usize {
        self.domains.len() + self.rules.len() + self.exceptions.len()
    }
}

pub fn abp_rule(host: &str) -> String {
    format!("||{host}^")
}

pub fn abp_exception(host: &str) -> String {
    format!("@@||{host}^")
}

/// Accumulates classified lines across all sources of one pipeline. Results
/// may be ingested in any order; duplicates are dropped on later sight.
pub struct Normalizer {
    kind: ListKind,
    stream: ListStream,
}

impl Normalizer {
    pub fn new(kind: ListKind) -> Self {
        Normalizer {
            kind,
            stream: ListStream::default(),
        }
    }

    pub fn ingest(&mut self, result: &RawFetchResult) {
        let text = String::from_utf8_lossy(&result.bytes);
        for line in text.lines() {
            self.ingest_line(line);
        }
    }

    pub fn ingest_line(&mut self, line: &str) {
        match classify_line(line) {
            ClassifiedLine::Skip | ClassifiedLine::Discard => {}
            ClassifiedLine::Domain(host) => {
                self.stream.domains.insert(host);
            }
            ClassifiedLine::AbpBlock(host) => match self.kind {
                ListKind::Block => {
                    self.stream.rules.insert(abp_rule(&host));
                }
                // Only domains and exception rules carry meaning in an
                // allowlist source; a block rule there is noise.
                ListKind::Allow => {}
            },
            ClassifiedLine::AbpAllow(host) => match self.kind {
                // Exceptions in blocklist sources are kept aside for the
                // separator, which moves them to the allowlist.
                ListKind::Block => {
                    self.stream.exceptions.insert(abp_exception(&host));
                }
                // In an allowlist source the exception marker is redundant;
                // the rule allows its host either way.
                ListKind::Allow => {
                    self.stream.rules.insert(abp_rule(&host));
                }
            },
        }
    }

    pub fn mark_failed(&mut self, source: Source) {
        self.stream.failed.push(source);
    }

    pub fn finish(self) -> ListStream {
        self.stream
    }
}

#[cfg(test)]
mod tests {
    use crate::fetch::RawFetchResult;
    use crate::source::Source;

    use super::{ListKind, Normalizer};

    fn local_result(name: &str, content: &[u8]) -> RawFetchResult {
        RawFetchResult {
            source: Source::Local { path: name.into() },
            bytes: content.to_vec(),
        }
    }

    #[test]
    fn normalizer_accumulates_and_deduplicates_in_first_sight_order() {
        // arrange
        let mut normalizer = Normalizer::new(ListKind::Block);

        // act
        normalizer.ingest(&local_result(
            "a.txt",
            b"b.example.com\na.example.com\n||cdn.example.com^\n",
        ));
        normalizer.ingest(&local_result(
            "b.txt",
            b"a.example.com\n0.0.0.0 b.example.com\n",
        ));
        let stream = normalizer.finish();

        // assert
        let domains: Vec<&str> = stream.domains.iter().map(String::as_str).collect();
        assert_eq!(domains, ["b.example.com", "a.example.com"]);
        assert!(stream.rules.contains("||cdn.example.com^"));
        assert_eq!(stream.entry_count(), 3);
    }

    #[test]
    fn normalizer_shelves_exceptions_in_block_mode() {
        // arrange
        let mut normalizer = Normalizer::new(ListKind::Block);

        // act
        normalizer.ingest(&local_result(
            "a.txt",
            b"||tracker.com^\n@@||tracker.com^\n",
        ));
        let stream = normalizer.finish();

        // assert
        assert!(stream.rules.contains("||tracker.com^"));
        assert!(stream.exceptions.contains("@@||tracker.com^"));
    }

    #[test]
    fn normalizer_treats_exceptions_as_rules_in_allow_mode() {
        // arrange
        let mut normalizer = Normalizer::new(ListKind::Allow);

        // act
        normalizer.ingest(&local_result(
            "a.txt",
            b"@@||tracker.com^\n||cdn.example.com^\nsafe.example.com\n",
        ));
        let stream = normalizer.finish();

        // assert: the exception is productive, the block rule is not
        assert!(stream.rules.contains("||tracker.com^"));
        assert!(!stream.rules.contains("||cdn.example.com^"));
        assert!(stream.domains.contains("safe.example.com"));
        assert!(stream.exceptions.is_empty());
    }

    #[test]
    fn normalizer_output_is_independent_of_source_order() {
        // arrange
        let first = local_result("a.txt", b"a.example.com\n||b.example.com^\n");
        let second = local_result("b.txt", b"c.example.com\na.example.com\n");

        // act
        let mut forward = Normalizer::new(ListKind::Block);
        forward.ingest(&first);
        forward.ingest(&second);
        let forward = forward.finish();

        let mut reverse = Normalizer::new(ListKind::Block);
        reverse.ingest(&second);
        reverse.ingest(&first);
        let reverse = reverse.finish();

        // assert: IndexSet equality is order-independent set equality
        assert_eq!(forward.domains, reverse.domains);
        assert_eq!(forward.rules, reverse.rules);
    }

    #[test]
    fn normalizer_decodes_invalid_utf8_with_replacement() {
        // arrange
        let mut normalizer = Normalizer::new(ListKind::Block);
        let mut bytes = b"a.example.com\n".to_vec();
        bytes.extend_from_slice(&[0xff, 0xfe, b'\n']);
        bytes.extend_from_slice(b"b.example.com\n");

        // act
        normalizer.ingest(&local_result("a.txt", &bytes));
        let stream = normalizer.finish();

        // assert
        assert!(stream.domains.contains("a.example.com"));
        assert!(stream.domains.contains("b.example.com"));
        assert_eq!(stream.domains.len(), 2);
    }

    #[test]
    fn normalizer_records_failed_sources() {
        // arrange
        let mut normalizer = Normalizer::new(ListKind::Block);
        let source = Source::Local {
            path: "gone.txt".into(),
        };

        // act
        normalizer.mark_failed(source.clone());
        let stream = normalizer.finish();

        // assert
        assert_eq!(stream.failed, [source]);
    }
}
