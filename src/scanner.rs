/// Returns the offset of the closer balancing an opener that ends at `start`.
pub fn scan_nested_comment(src: &str, start: usize, open: &str, close: &str) -> Option<usize> {
    let mut depth = 1usize;
    let mut i = start;
    while i < src.len() {
        let rest = &src[i..];
        if rest.starts_with(open) {
            depth += 1;
            i += open.len();
        } else if rest.starts_with(close) {
            depth -= 1;
            if depth == 0 {
                return Some(i);
            }
            i += close.len();
        } else {
            i += rest.chars().next().map_or(1, char::len_utf8);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stops_at_first_balanced_closer() {
        let src = "{# a #} b #}";
        assert_eq!(scan_nested_comment(src, 2, "{#", "#}"), Some(5));
    }

    #[test]
    fn counts_nested_openers() {
        let src = "{# a {# b #} c #}";
        assert_eq!(scan_nested_comment(src, 2, "{#", "#}"), Some(15));
    }

    #[test]
    fn unterminated_comment_yields_nothing() {
        assert_eq!(scan_nested_comment("{# a {# b #}", 2, "{#", "#}"), None);
        assert_eq!(scan_nested_comment("{#", 2, "{#", "#}"), None);
    }

    #[test]
    fn custom_delimiters_and_multibyte_text() {
        let src = "<# é <# ü #> #>";
        let end = scan_nested_comment(src, 2, "<#", "#>").expect("closed");
        assert_eq!(&src[end..], "#>");
    }
}
