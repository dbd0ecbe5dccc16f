//! Which files are worth turning into project files, and how to label them.

/// Files above this size are never ingested.
pub const MAX_FILE_BYTES: u64 = 1024 * 1024;

const BINARY_EXTENSIONS: &[&str] = &[
    // images
    "jpg", "jpeg", "png", "gif", "bmp", "ico", "svg", "webp",
    // audio / video
    "mp3", "mp4", "wav", "ogg", "avi", "mov", "webm",
    // documents
    "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx",
    // archives
    "zip", "rar", "tar", "gz", "7z",
    // executables and objects
    "exe", "dll", "so", "dylib", "o", "obj",
    // fonts
    "ttf", "otf", "woff", "woff2",
    // bytecode
    "pyc", "class",
];

const TEXT_EXTENSIONS: &[&str] = &[
    "js", "jsx", "ts", "tsx", "html", "css", "scss", "json", "md", "txt", "py", "java", "c",
    "cpp", "cs", "go", "rb", "php", "swift", "kt", "rs", "sh", "bash", "yml", "yaml", "toml",
    "ini", "cfg", "conf", "xml", "svg", "sql", "graphql", "prisma",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    TooLarge,
    Binary,
}

impl SkipReason {
    pub fn as_str(self) -> &'static str {
        match self {
            SkipReason::TooLarge => "too_large",
            SkipReason::Binary => "binary",
        }
    }
}

/// Lower-cased extension of the last path component, if any.
fn extension(name: &str) -> Option<String> {
    let file_name = name.rsplit('/').next().unwrap_or(name);
    let (stem, ext) = file_name.rsplit_once('.')?;
    if stem.is_empty() && !file_name[1..].contains('.') {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

pub fn skip_reason(name: &str, size: u64) -> Option<SkipReason> {
    if size > MAX_FILE_BYTES {
        return Some(SkipReason::TooLarge);
    }
    is_binary(name).then_some(SkipReason::Binary)
}

/// Suffix match, so a bare `.png` counts as an image too.
fn is_binary(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    BINARY_EXTENSIONS.iter().any(|ext| {
        name.strip_suffix(ext)
            .is_some_and(|rest| rest.ends_with('.'))
    })
}

/// Whether a standalone upload should also become a project file.
pub fn is_text_like(name: &str, mime_type: &str) -> bool {
    if mime_type.starts_with("text/") {
        return true;
    }
    extension(name).is_some_and(|ext| TEXT_EXTENSIONS.contains(&ext.as_str()))
}

/// Language tag used for syntax highlighting and fenced code blocks.
pub fn file_type(name: &str) -> &'static str {
    let Some(ext) = extension(name) else {
        return "text";
    };
    match ext.as_str() {
        "js" | "jsx" => "javascript",
        "ts" | "tsx" => "typescript",
        "html" => "html",
        "css" => "css",
        "scss" => "scss",
        "json" => "json",
        "md" => "markdown",
        "py" => "python",
        "java" => "java",
        "c" => "c",
        "cpp" => "cpp",
        "cs" => "csharp",
        "go" => "go",
        "rb" => "ruby",
        "php" => "php",
        "swift" => "swift",
        "kt" => "kotlin",
        "rs" => "rust",
        "sh" | "bash" => "shell",
        "yml" | "yaml" => "yaml",
        "toml" => "toml",
        "xml" => "xml",
        "svg" => "svg",
        "sql" => "sql",
        "graphql" => "graphql",
        "prisma" => "prisma",
        _ => "text",
    }
}
