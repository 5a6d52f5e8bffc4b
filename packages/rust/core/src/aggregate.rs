//! Text aggregation: per-file texts → one corpus.

use lessonforge_shared::{CORPUS_SEPARATOR, Corpus, ExtractedText};

/// Join every text, empty ones included, with a blank line, keeping input order.
pub fn aggregate(texts: &[ExtractedText]) -> Corpus {
    let parts: Vec<&str> = texts.iter().map(|t| t.text.as_str()).collect();
    Corpus::new(parts.join(CORPUS_SEPARATOR))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(values: &[&str]) -> Vec<ExtractedText> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| ExtractedText {
                file_id: format!("f{i}"),
                text: v.to_string(),
            })
            .collect()
    }

    #[test]
    fn joins_with_blank_line_in_order() {
        let corpus = aggregate(&texts(&["page one", "page two", "page three"]));
        assert_eq!(corpus.as_str(), "page one\n\npage two\n\npage three");
    }

    #[test]
    fn empty_slots_are_kept() {
        let corpus = aggregate(&texts(&["a", "", "c"]));
        assert_eq!(corpus.as_str(), "a\n\n\n\nc");
    }

    #[test]
    fn all_empty_is_valid() {
        assert!(aggregate(&[]).is_empty());
        assert!(aggregate(&texts(&["", ""])).is_blank());
    }

    #[test]
    fn concatenation_splits_at_separator() {
        let xs = texts(&["a", "", "b"]);
        let ys = texts(&["c", "d"]);
        let joined: Vec<ExtractedText> = xs.iter().chain(ys.iter()).cloned().collect();

        let expected = format!("{}\n\n{}", aggregate(&xs), aggregate(&ys));
        assert_eq!(aggregate(&joined).as_str(), expected);
    }
}
