//! Chat acquisition and persistence.
//!
//! - `router`: URL → platform resolution
//! - `services`: per-platform transcript fetchers (YouTube replay chat, Twitch VOD comments)
//! - `downloader`: the yt-dlp driver behind the YouTube service
//! - `table`: the `# attrs:` CSV format, with atomic writes

pub mod archive;
pub mod downloader;
pub mod router;
mod services;
pub mod table;

pub use archive::{ChatArchive, SourceHandle};
pub use downloader::{
    live_chat_path, ChatDownloader, DownloadProgress, DownloadedChat, ProgressHook, VideoInfo,
    YtDlpDownloader,
};
pub use router::{resolve, SourceLocator};
pub use services::twitch::{CommentPager, TwitchChatSource};
pub use services::youtube::{
    convert_live_chat_file, format_upload_time, parse_live_chat, ConvertedChat, YouTubeChatSource,
};
pub use table::{decode_table, encode_table, read_table, write_table, ATTRS_MARKER};
