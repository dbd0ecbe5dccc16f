use core_types::{Attachment, ChatMessage, ChatRole, ProjectFile};

/// Files shorter than this many characters are inlined into the prompt.
pub const INLINE_CONTENT_LIMIT: usize = 5000;

/// Folds attachment and project-file summaries into the most recent user
/// message. Every other message is returned unchanged.
pub fn compose(
    messages: &[ChatMessage],
    attachments: &[Attachment],
    project_files: &[ProjectFile],
) -> Vec<ChatMessage> {
    let mut composed = messages.to_vec();
    let Some(index) = composed
        .iter()
        .rposition(|message| message.role == ChatRole::User)
    else {
        return composed;
    };

    let mut extra = String::new();

    if !attachments.is_empty() {
        let descriptions: Vec<String> = attachments.iter().map(describe_attachment).collect();
        extra.push_str("\n\n");
        extra.push_str(&descriptions.join("\n"));
    }

    if !project_files.is_empty() {
        let listing: Vec<String> = project_files
            .iter()
            .map(|file| format!("- {}", file.path))
            .collect();
        extra.push_str("\n\nProject files available for analysis:\n");
        extra.push_str(&listing.join("\n"));

        let (small, large): (Vec<&ProjectFile>, Vec<&ProjectFile>) = project_files
            .iter()
            .partition(|file| file.content.chars().count() < INLINE_CONTENT_LIMIT);

        if !small.is_empty() {
            let contents: Vec<String> = small
                .iter()
                .map(|file| {
                    format!(
                        "File: {}\n```{}\n{}\n```",
                        file.path, file.file_type, file.content
                    )
                })
                .collect();
            extra.push_str("\n\nContent of selected files:\n\n");
            extra.push_str(&contents.join("\n\n"));
        }

        if !large.is_empty() {
            let listing: Vec<String> = large
                .iter()
                .map(|file| {
                    format!(
                        "- {} ({})",
                        file.path,
                        format_file_size(file.content.len() as u64)
                    )
                })
                .collect();
            extra.push_str("\n\nLarger files available (ask about specific sections if needed):\n");
            extra.push_str(&listing.join("\n"));
        }
    }

    composed[index].content.push_str(&extra);
    composed
}

fn describe_attachment(attachment: &Attachment) -> String {
    if attachment.is_zip {
        format!(
            "[Attached ZIP file: {}, containing {} files]",
            attachment.name,
            attachment.file_count.unwrap_or(0)
        )
    } else {
        format!(
            "[Attached file: {}, Type: {}, Size: {}]",
            attachment.name,
            attachment.mime_type,
            format_file_size(attachment.size_bytes)
        )
    }
}

pub fn format_file_size(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * 1024;
    if bytes < KIB {
        format!("{bytes} bytes")
    } else if bytes < MIB {
        format!("{:.1} KB", bytes as f64 / KIB as f64)
    } else {
        format!("{:.1} MB", bytes as f64 / MIB as f64)
    }
}
