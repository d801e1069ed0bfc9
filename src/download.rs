use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::{self, Write};

fn progress_bar(total_size: u64, label: &str) -> ProgressBar {
    let pb = ProgressBar::new(total_size);
    let style = ProgressStyle::default_bar()
        .template("{msg} {spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
        .map(|style| style.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb.set_message(format!("Downloading {}", label));
    pb
}

/// Streams the body of `response` into `out`, returning the number of bytes
/// written. The file is flushed to disk before returning.
pub async fn stream_to_file(
    response: reqwest::Response,
    out: &mut File,
    label: &str,
) -> Result<u64, crate::install::github::ReleaseError> {
    let total_size = response.content_length().unwrap_or(0);
    let pb = progress_bar(total_size, label);

    let mut downloaded = 0u64;
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                pb.abandon_with_message("Download interrupted");
                return Err(e.into());
            }
        };
        if let Err(e) = out.write_all(&chunk) {
            pb.abandon_with_message("Download interrupted");
            return Err(e.into());
        }
        downloaded += chunk.len() as u64;
        pb.set_position(downloaded);
    }

    finish(out)?;

    if total_size > 0 && downloaded != total_size {
        pb.abandon_with_message("Download incomplete");
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("expected {} bytes, received {}", total_size, downloaded),
        )
        .into());
    }

    pb.finish_with_message("Download complete");
    tracing::debug!("Wrote {} bytes for {}", downloaded, label);
    Ok(downloaded)
}

fn finish(out: &mut File) -> io::Result<()> {
    out.flush()?;
    out.sync_all()
}
