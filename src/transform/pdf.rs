use std::path::{Path, PathBuf};

use async_trait::async_trait;
use lopdf::{Dictionary, Document, Object, StringFormat};

use super::{ensure_vacant, move_file, IssuePattern, Transform, TransformError, TransformJob};
use crate::paths;

/// Tags a staged PDF with series/issue metadata and writes it to the output
/// directory as `"{series} {issue}{suffix}"`.
///
/// The issue label comes from the filename pattern; a name the pattern does
/// not match is a [`TransformError::PatternMismatch`] and nothing is written.
#[derive(Debug, Clone)]
pub struct PdfTagger {
    pattern: IssuePattern,
    separator: String,
    output_dir: PathBuf,
    suffix: String,
}

impl PdfTagger {
    pub fn new(
        pattern: IssuePattern,
        separator: impl Into<String>,
        output_dir: impl Into<PathBuf>,
        suffix: impl Into<String>,
    ) -> Self {
        Self {
            pattern,
            separator: separator.into(),
            output_dir: output_dir.into(),
            suffix: suffix.into(),
        }
    }
}

#[async_trait]
impl Transform for PdfTagger {
    async fn apply(&self, job: &TransformJob<'_>) -> Result<PathBuf, TransformError> {
        let issue = self
            .pattern
            .issue_label(job.filename, &self.separator)
            .ok_or_else(|| TransformError::PatternMismatch {
                pattern: self.pattern.as_str().to_string(),
                filename: job.filename.to_string(),
            })?;

        let dest = self
            .output_dir
            .join(paths::tagged_filename(job.series, &issue, &self.suffix));
        ensure_vacant(&dest).await?;
        let part = paths::part_path(&dest);

        let src = job.staged.to_path_buf();
        let author = job.series.to_string();
        let title = issue.clone();
        let part_out = part.clone();
        let tagged = tokio::task::spawn_blocking(move || {
            set_document_info(&src, &part_out, &author, &title)
        })
        .await?;
        if let Err(e) = tagged {
            let _ = tokio::fs::remove_file(&part).await;
            return Err(e);
        }

        move_file(&part, &dest).await?;
        if let Err(e) = tokio::fs::remove_file(job.staged).await {
            tracing::warn!("Could not remove staged file {}: {}", job.staged.display(), e);
        }
        tracing::info!("Processed {} -> {}", job.filename, dest.display());
        Ok(dest)
    }
}

/// Load `src`, set `/Author` and `/Title` in its document information
/// dictionary, and save the result to `dest`.
pub fn set_document_info(
    src: &Path,
    dest: &Path,
    author: &str,
    title: &str,
) -> Result<(), TransformError> {
    let pdf_err = |path: &Path, e: &dyn std::fmt::Display| TransformError::Pdf {
        path: path.to_path_buf(),
        message: e.to_string(),
    };

    let mut doc = Document::load(src).map_err(|e| pdf_err(src, &e))?;

    let info_id = match doc.trailer.get(b"Info").ok().cloned() {
        Some(Object::Reference(id)) if doc.get_dictionary(id).is_ok() => id,
        Some(Object::Dictionary(inline)) => doc.add_object(inline),
        _ => doc.add_object(Dictionary::new()),
    };
    doc.trailer.set("Info", Object::Reference(info_id));

    let info = doc
        .get_object_mut(info_id)
        .and_then(Object::as_dict_mut)
        .map_err(|e| pdf_err(src, &e))?;
    info.set("Author", text_string(author));
    info.set("Title", text_string(title));

    doc.save(dest).map_err(|e| pdf_err(dest, &e))?;
    Ok(())
}

/// PDF text string: a literal for ASCII, UTF-16BE with BOM otherwise.
fn text_string(s: &str) -> Object {
    if s.is_ascii() {
        return Object::string_literal(s);
    }
    let mut bytes = vec![0xFE, 0xFF];
    for unit in s.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    Object::String(bytes, StringFormat::Hexadecimal)
}

/// Single blank page, enough for lopdf to load and re-save.
#[cfg(test)]
pub(crate) fn write_minimal_pdf(path: &Path) {
    use lopdf::dictionary;

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(path).unwrap();
}
