//! Chat-facing text for listings, status messages and completions.

use std::fmt::Write;

use marquee_core::{
    ActiveDownload, CandidateResult, DeliveryOptions, SelectionOption, human_bytes, human_rate,
};

/// Text plus options ready for delivery.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reply {
    /// Message body.
    pub text: String,
    /// Delivery options.
    pub options: DeliveryOptions,
}

impl Reply {
    /// Plain text reply.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            options: DeliveryOptions::default(),
        }
    }
}

/// Numbered listing with one selection token per candidate, in the given order.
#[must_use]
pub fn search_listing(query: &str, candidates: &[CandidateResult]) -> Reply {
    let mut text = format!("Results for \"{query}\":\n");
    let mut selections = Vec::with_capacity(candidates.len());
    for (index, candidate) in candidates.iter().enumerate() {
        let position = index + 1;
        let _ = writeln!(
            text,
            "{position}. {} [{}]\n   {} | seeds {} | leeches {}",
            candidate.title,
            candidate.source,
            human_bytes(candidate.size_kb.saturating_mul(1024)),
            candidate.seeds,
            candidate.leeches,
        );
        selections.push(SelectionOption {
            label: position.to_string(),
            token: candidate.id.token(),
        });
    }
    Reply {
        text: text.trim_end().to_string(),
        options: DeliveryOptions {
            selections,
            ..DeliveryOptions::default()
        },
    }
}

/// Reply for a search that found nothing.
#[must_use]
pub fn no_results(query: &str) -> Reply {
    Reply::text(format!("No results for \"{query}\"."))
}

/// Progress text for one download.
#[must_use]
pub fn status_text(download: &ActiveDownload) -> String {
    format!(
        "{}\n{} {:.1}% ({} of {})\ndown {} | up {}",
        download.display_name,
        download.state.label(),
        download.percent_complete(),
        human_bytes(download.downloaded_bytes),
        human_bytes(download.total_bytes),
        human_rate(download.rates.download_bps),
        human_rate(download.rates.upload_bps),
    )
}

/// Queue listing with a status selection per download.
#[must_use]
pub fn queue_listing(downloads: &[ActiveDownload], capacity: usize) -> Reply {
    if downloads.is_empty() {
        return Reply::text("No downloads in the queue.");
    }
    let mut text = format!("Downloads ({}/{capacity}):\n", downloads.len());
    let mut selections = Vec::with_capacity(downloads.len());
    for (index, download) in downloads.iter().enumerate() {
        let position = index + 1;
        let _ = writeln!(
            text,
            "{position}. {} {:.1}% [{}]",
            download.display_name,
            download.percent_complete(),
            download.state.label(),
        );
        selections.push(SelectionOption {
            label: format!("{position} status"),
            token: download.transfer_id.to_string(),
        });
    }
    Reply {
        text: text.trim_end().to_string(),
        options: DeliveryOptions {
            selections,
            ..DeliveryOptions::default()
        },
    }
}

/// Confirmation sent after a successful admission, offering a status selection.
#[must_use]
pub fn admitted(download: &ActiveDownload) -> Reply {
    Reply {
        text: format!("Download started: {}", download.display_name),
        options: DeliveryOptions {
            selections: vec![SelectionOption {
                label: "status".to_string(),
                token: download.transfer_id.to_string(),
            }],
            ..DeliveryOptions::default()
        },
    }
}

/// Completion message listing the payload files, with the files attached.
#[must_use]
pub fn completion(download: &ActiveDownload) -> Reply {
    let mut text = format!("Download finished: {}", download.display_name);
    for file in &download.files {
        let _ = write!(text, "\n - {} ({})", file.name, human_bytes(file.size_bytes));
    }
    Reply {
        text,
        options: DeliveryOptions {
            attachments: download.files.iter().map(|file| file.path.clone()).collect(),
            ..DeliveryOptions::default()
        },
    }
}
