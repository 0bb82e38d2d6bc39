//! Named constants shared across crates, so there is exactly one
//! definition of each tunable instead of the same number scattered and
//! occasionally disagreeing across call sites.

/// Canonical cap on a tool result's `output` field, and on a `Step`'s
/// recorded `output`. Used everywhere truncation of tool/verification
/// output is needed.
pub const STEP_OUTPUT_TRUNCATE_BYTES: usize = 6 * 1024;

/// Verification failure feedback clips each command's output to this many
/// characters before feeding it back into the loop.
pub const VERIFICATION_OUTPUT_CLIP_CHARS: usize = 1500;

/// Checkpoints are written at least this often (in iterations).
pub const CHECKPOINT_INTERVAL: u32 = 2;

/// In-progress checkpoints older than this are not resumable.
pub const CHECKPOINT_STALE_SECS: i64 = 5 * 60;

/// Consecutive iterations without a mutation before the no-mutation guard
/// injects a directive (mutation-like goals only).
pub const STAGNATION_NO_MUTATION_ITERATIONS: u32 = 4;

/// Consecutive iterations with an identical action signature before the
/// repeated-action guard injects a directive.
pub const STAGNATION_REPEAT_ACTION_ITERATIONS: u32 = 3;

/// Maximum number of stagnation interventions per run.
pub const MAX_STAGNATION_INTERVENTIONS: u32 = 4;

/// Maximum decision-parser retry attempts per iteration.
pub const MAX_PARSE_ATTEMPTS: u32 = 8;

/// Cap on model-transport exponential backoff.
pub const MODEL_BACKOFF_CAP_MS: u64 = 6_500;

/// Context budget levels, largest first.
pub const CONTEXT_BUDGET_LEVELS: [usize; 4] = [52_000, 36_000, 24_000, 16_000];

/// Minimum number of most-recent messages always retained in the tail.
pub const CONTEXT_MIN_TAIL_MESSAGES: usize = 10;

/// History-length compaction trigger (message count).
pub const COMPACTION_MESSAGE_THRESHOLD: usize = 180;

/// History-length compaction trigger (estimated tokens).
pub const COMPACTION_TOKEN_THRESHOLD: usize = 68_000;

/// Number of most-recent messages kept verbatim after compaction.
pub const COMPACTION_TAIL_KEEP: usize = 28;

/// Operational memory summary cap (characters).
pub const OPERATIONAL_MEMORY_SUMMARY_MAX_CHARS: usize = 5_200;

/// Memory entry field caps.
pub const MEMORY_TITLE_MAX_CHARS: usize = 160;
pub const MEMORY_CONTENT_MAX_CHARS: usize = 2_800;
pub const MEMORY_MAX_TAGS: usize = 14;
pub const MEMORY_MAX_EVIDENCE: usize = 10;
pub const MEMORY_MAX_RELATIONS: usize = 16;
pub const MEMORY_STORE_CAP: usize = 2_200;
pub const CONTINUATION_SUMMARY_MAX_CHARS: usize = 1_200;
pub const CONTINUATION_MAX_ITEMS: usize = 24;

/// Supervisor bounds.
pub const SUPERVISOR_MAX_CYCLES: u32 = 6;
pub const SUPERVISOR_MAX_RUNTIME_MS: i64 = 20 * 60 * 1000;
pub const SUPERVISOR_MAX_NO_PROGRESS_CYCLES: u32 = 2;

/// Command sandbox bounds.
pub const COMMAND_TIMEOUT_SECS: u64 = 120;
pub const COMMAND_OUTPUT_BUFFER_BYTES: usize = 800 * 1024;
pub const COMMAND_ARG_MAX_CHARS: usize = 1000;

/// Path validation bounds.
pub const PATH_MAX_CHARS: usize = 260;

/// `list_tree` depth clamp.
pub const LIST_TREE_MIN_DEPTH: u32 = 1;
pub const LIST_TREE_MAX_DEPTH: u32 = 8;
pub const LIST_TREE_DEFAULT_DEPTH: u32 = 4;

/// `search_files` result-count clamp.
pub const SEARCH_MIN_RESULTS: usize = 1;
pub const SEARCH_MAX_RESULTS: usize = 250;
pub const SEARCH_DEFAULT_RESULTS: usize = 50;

/// `read_file` truncates whole-file reads past this many bytes.
pub const READ_FILE_MAX_BYTES: usize = 350 * 1024;

/// File extensions `read_file`/`read_many_files` refuse to decode as text.
pub const BINARY_FILE_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "bmp", "ico", "webp", "pdf", "zip", "tar", "gz", "bz2", "7z",
    "exe", "dll", "so", "dylib", "bin", "wasm", "class", "jar", "woff", "woff2", "ttf", "otf",
    "mp3", "mp4", "mov", "avi", "sqlite", "db",
];

/// `read_many_files` path-count and per-file line clamp.
pub const READ_MANY_FILES_MAX_PATHS: usize = 12;
pub const READ_MANY_FILES_MIN_LINES: u32 = 20;
pub const READ_MANY_FILES_MAX_LINES: u32 = 800;
pub const READ_MANY_FILES_DEFAULT_LINES: u32 = 200;
