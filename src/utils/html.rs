/// Strips markup that could run in a reader's browser from user-written post
/// content. Safe formatting tags survive; scripts, event handlers and
/// frames are removed along with their content.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripts_are_removed() {
        assert_eq!(
            clean_html("hi <b>there</b><script>alert(1)</script>"),
            "hi <b>there</b>"
        );
    }

    #[test]
    fn plain_text_is_untouched() {
        assert_eq!(clean_html("just words"), "just words");
    }
}
