use crate::catalog::Catalog;
use crate::document::Document;

use chrono::{DateTime, Datelike, Utc};

/// Substitute `{placeholder}` fields in titles, email subjects/bodies, and
/// webhook parameters. Unknown placeholders render as empty strings so a
/// stale template degrades instead of leaking braces into output.
pub fn render(template: &str, document: &Document, catalog: &Catalog) -> String {
    let mut out = template.to_string();
    for (placeholder, value) in placeholder_values(document, catalog) {
        if out.contains(placeholder) {
            out = out.replace(placeholder, &value);
        }
    }
    out
}

fn placeholder_values(document: &Document, catalog: &Catalog) -> Vec<(&'static str, String)> {
    let correspondent = document
        .correspondent_id
        .and_then(|id| catalog.correspondent(id))
        .map(|c| c.name.clone())
        .unwrap_or_default();
    let document_type = document
        .document_type_id
        .and_then(|id| catalog.document_type(id))
        .map(|d| d.name.clone())
        .unwrap_or_default();

    let mut values = vec![
        ("{title}", document.title.clone()),
        ("{correspondent}", correspondent),
        ("{document_type}", document_type),
        ("{asn}", document.asn.clone().unwrap_or_default()),
        (
            "{owner}",
            document
                .owner_id
                .map(|id| id.to_string())
                .unwrap_or_default(),
        ),
        (
            "{original_filename}",
            document.original_filename.clone(),
        ),
    ];
    values.extend(date_values(
        "{created}",
        "{created_year}",
        "{created_month}",
        "{created_day}",
        document.created_at,
    ));
    values.extend(date_values(
        "{added}",
        "{added_year}",
        "{added_month}",
        "{added_day}",
        document.added_at,
    ));
    values
}

fn date_values(
    full: &'static str,
    year: &'static str,
    month: &'static str,
    day: &'static str,
    date: Option<DateTime<Utc>>,
) -> Vec<(&'static str, String)> {
    match date {
        Some(d) => vec![
            (full, d.format("%Y-%m-%d").to_string()),
            (year, d.year().to_string()),
            (month, format!("{:02}", d.month())),
            (day, format!("{:02}", d.day())),
        ],
        None => vec![
            (full, String::new()),
            (year, String::new()),
            (month, String::new()),
            (day, String::new()),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Correspondent;
    use crate::matching::MatchRule;
    use chrono::TimeZone;

    fn fixture() -> (Document, Catalog) {
        let catalog = Catalog {
            correspondents: vec![Correspondent {
                id: 9,
                name: "ACME GmbH".to_string(),
                rule: MatchRule::disabled(),
            }],
            ..Default::default()
        };
        let document = Document {
            id: 1,
            title: "Invoice March".to_string(),
            original_filename: "scan_0001.pdf".to_string(),
            correspondent_id: Some(9),
            created_at: Some(Utc.with_ymd_and_hms(2026, 3, 5, 12, 0, 0).unwrap()),
            ..Default::default()
        };
        (document, catalog)
    }

    #[test]
    fn substitutes_known_placeholders() {
        let (document, catalog) = fixture();
        let rendered = render(
            "{correspondent}/{created_year}-{created_month}/{title}",
            &document,
            &catalog,
        );
        assert_eq!(rendered, "ACME GmbH/2026-03/Invoice March");
    }

    #[test]
    fn unknown_references_render_empty() {
        let (mut document, catalog) = fixture();
        document.correspondent_id = Some(999); // not in catalog
        let rendered = render("[{correspondent}] {original_filename}", &document, &catalog);
        assert_eq!(rendered, "[] scan_0001.pdf");
    }

    #[test]
    fn text_without_placeholders_is_unchanged() {
        let (document, catalog) = fixture();
        assert_eq!(render("plain text", &document, &catalog), "plain text");
    }
}
