//! Cross-module unit tests for folio-markup.

use std::path::Path;

use rstest::rstest;

use crate::{MarkupDocument, MarkupParser, Selector, StructureChecker};

// =============================================================================
// Parser Tests
// =============================================================================

#[rstest]
#[case("<p>Hello</p>", false)]
#[case("<div class=\"a\">Text</div>", false)]
#[case("<div <span>", true)]
fn parser_detects_errors(#[case] source: &str, #[case] has_errors: bool) {
    let mut parser = MarkupParser::new().expect("parser init");
    let result = parser.parse(source).expect("parse");
    assert_eq!(result.has_errors(), has_errors);
}

// =============================================================================
// Selection Tests
// =============================================================================

#[test]
fn selected_content_range_splices_cleanly() {
    let source = "<header>\n  <h1 id=\"title\">Original Title</h1>\n</header>\n";
    let document = MarkupDocument::parse(source).expect("parse");
    let selector = Selector::compile("#title").expect("compile");
    let matches = document.select(&selector);
    let element = matches.first().expect("match");
    let range = element.content_range().expect("content");

    let mut edited = source.to_owned();
    edited.replace_range(range, "Updated Title");
    assert_eq!(
        edited,
        "<header>\n  <h1 id=\"title\">Updated Title</h1>\n</header>\n"
    );
    assert_eq!(element.line(), 2);
}

#[test]
fn script_and_style_elements_are_selectable() {
    let source = "<style>.a{}</style><script type=\"text/x-template\">x</script>";
    let document = MarkupDocument::parse(source).expect("parse");
    let selector = Selector::compile("script[type]").expect("compile");
    assert_eq!(document.select(&selector).len(), 1);
}

// =============================================================================
// Structure Tests
// =============================================================================

#[rstest]
#[case("page.html", "<div><span>ok</span></div>", true)]
#[case("page.html", "<div><span>broken</div>", false)]
#[case("messages.php", "<?php return ['a' => 'b'];", true)]
#[case("messages.php", "<?php return ['a' => 'b';", false)]
#[case("en.json", "{\"a\": \"b\"}", true)]
#[case("en.json", "{\"a\": \"b\",}", false)]
fn structure_checker_by_kind(#[case] path: &str, #[case] content: &str, #[case] clean: bool) {
    let checker = StructureChecker::new();
    let issues = checker
        .check_file(Path::new(path), content)
        .expect("check");
    assert_eq!(issues.is_empty(), clean, "{issues:?}");
}

#[test]
fn checker_is_shareable_across_threads() {
    let checker = StructureChecker::new();
    std::thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                let issues = checker
                    .check_file(Path::new("page.html"), "<div></div>")
                    .expect("check");
                assert!(issues.is_empty());
            });
        }
    });
}
