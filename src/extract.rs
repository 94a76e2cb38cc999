use scraper::{ElementRef, Html};
use serde_json::{Map, Value, json};

use crate::domain::{Artifact, ExtractedRecord, Identifier};
use crate::validate::{find_heading, page_warning, selector};

/// Turns validated content into a structured artifact. Never fails: faults
/// end up in the artifact instead.
pub trait Extractor: Send + Sync {
    fn extract(&self, content: &str, identifier: &Identifier) -> Artifact;
}

const NARRATIVE_SECTIONS: [&str; 5] = [
    "Overview",
    "Structure",
    "Functions",
    "Interactions",
    "Clinical Significance",
];

const INFO_ITEMS: [(&str, &str); 3] = [
    ("gene_names", "gene names: "),
    ("gene_alias", "gene alias: "),
    ("gene_type", "type: "),
];

type Section = fn(&Html, &mut Map<String, Value>) -> Result<(), String>;

/// Extracts an encyclopedia page section by section. Every section is
/// optional and independent of the others.
#[derive(Debug, Clone, Copy, Default)]
pub struct PageExtractor;

impl PageExtractor {
    pub fn extract_record(&self, content: &str, identifier: &Identifier) -> ExtractedRecord {
        let mut record = ExtractedRecord::new(identifier.clone());
        record.insert("gene_name", identifier.as_str());

        let document = Html::parse_document(content);
        let mut faults = Vec::new();

        match page_warning(&document) {
            Ok(Some(reason)) => {
                record.error = Some(reason.to_string());
                return record;
            }
            Ok(None) => {}
            Err(err) => faults.push(format!("warning check: {err}")),
        }

        let sections: [(&str, Section); 4] = [
            ("info", extract_info),
            ("gene position", extract_position),
            ("related genes", extract_related_genes),
            ("references", extract_references),
        ];
        for (name, section) in sections {
            if let Err(err) = section(&document, &mut record.fields) {
                faults.push(format!("{name}: {err}"));
            }
        }
        for heading in NARRATIVE_SECTIONS {
            if let Err(err) = extract_narrative(&document, heading, &mut record.fields) {
                faults.push(format!("{}: {err}", heading.to_lowercase()));
            }
        }

        if !faults.is_empty() {
            record.append_error(format!("Extraction error: {}", faults.join("; ")));
        }
        record
    }
}

impl Extractor for PageExtractor {
    fn extract(&self, content: &str, identifier: &Identifier) -> Artifact {
        Artifact::Record(self.extract_record(content, identifier))
    }
}

fn extract_info(document: &Html, fields: &mut Map<String, Value>) -> Result<(), String> {
    let Some(heading) = find_heading(document, "Info")? else {
        return Ok(());
    };
    let container = enclosing_div(heading)
        .and_then(enclosing_div)
        .ok_or_else(|| "heading has no enclosing container".to_string())?;
    let li = selector("li")?;
    let items: Vec<ElementRef<'_>> = container.select(&li).collect();
    if items.len() < INFO_ITEMS.len() {
        return Ok(());
    }
    for (item, (key, prefix)) in items.iter().zip(INFO_ITEMS) {
        if let Some(text) = first_paragraph(*item)? {
            fields.insert(key.to_string(), json!(text.replace(prefix, "").trim()));
        }
    }
    Ok(())
}

fn extract_position(document: &Html, fields: &mut Map<String, Value>) -> Result<(), String> {
    let Some(heading) = find_heading(document, "Gene Position (hg19)")? else {
        return Ok(());
    };
    let container =
        enclosing_div(heading).ok_or_else(|| "heading has no enclosing container".to_string())?;
    let Some(table) = next_sibling_named(container, "table") else {
        return Ok(());
    };
    let tr = selector("tr")?;
    let td = selector("td")?;
    let Some(row) = table.select(&tr).nth(1) else {
        return Ok(());
    };
    let cells: Vec<String> = row
        .select(&td)
        .map(|cell| text_of(cell).trim().to_string())
        .collect();
    if let [chr, end, start, strand] = cells.as_slice() {
        // Column order as the page publishes it.
        fields.insert(
            "gene_position".to_string(),
            json!({ "chr": chr, "end": end, "start": start, "strand": strand }),
        );
    }
    Ok(())
}

fn extract_related_genes(document: &Html, fields: &mut Map<String, Value>) -> Result<(), String> {
    let Some(heading) = find_heading(document, "Related Genes")? else {
        return Ok(());
    };
    let parent =
        enclosing_div(heading).ok_or_else(|| "heading has no enclosing container".to_string())?;
    let button = selector(r#"div[role="button"]"#)?;

    let candidates = [
        next_sibling_named(parent, "div"),
        enclosing_div(parent).and_then(|outer| next_sibling_named(outer, "div")),
    ];
    let Some(list) = candidates
        .iter()
        .flatten()
        .find(|candidate| candidate.select(&button).next().is_some())
        .or_else(|| candidates.iter().flatten().next())
    else {
        return Ok(());
    };

    let mut genes = Vec::new();
    for entry in list.select(&button) {
        if let Some(text) = first_paragraph(entry)? {
            genes.push(Value::String(text));
        }
    }
    fields.insert("related_genes".to_string(), Value::Array(genes));
    Ok(())
}

fn extract_narrative(
    document: &Html,
    heading: &str,
    fields: &mut Map<String, Value>,
) -> Result<(), String> {
    let Some(found) = find_heading(document, heading)? else {
        return Ok(());
    };
    let container =
        enclosing_div(found).ok_or_else(|| "heading has no enclosing container".to_string())?;
    let p = selector("p")?;
    let text = container
        .select(&p)
        .map(text_of)
        .collect::<Vec<_>>()
        .join(" ");
    fields.insert(heading.to_lowercase(), json!(text.trim()));
    Ok(())
}

fn extract_references(document: &Html, fields: &mut Map<String, Value>) -> Result<(), String> {
    let Some(heading) = find_heading(document, "References")? else {
        return Ok(());
    };
    let container =
        enclosing_div(heading).ok_or_else(|| "heading has no enclosing container".to_string())?;
    let li = selector("li")?;
    let mut references = Vec::new();
    for item in container.select(&li) {
        if let Some(text) = first_paragraph(item)? {
            references.push(Value::String(text.trim().to_string()));
        }
    }
    fields.insert("references".to_string(), Value::Array(references));
    Ok(())
}

fn enclosing_div(element: ElementRef<'_>) -> Option<ElementRef<'_>> {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|ancestor| ancestor.value().name() == "div")
}

fn next_sibling_named<'a>(element: ElementRef<'a>, name: &str) -> Option<ElementRef<'a>> {
    element
        .next_siblings()
        .filter_map(ElementRef::wrap)
        .find(|sibling| sibling.value().name() == name)
}

fn first_paragraph(element: ElementRef<'_>) -> Result<Option<String>, String> {
    let p = selector("p")?;
    Ok(element.select(&p).next().map(text_of))
}

fn text_of(element: ElementRef<'_>) -> String {
    element.text().collect()
}
