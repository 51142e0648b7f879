//! Fake media source for driving the playback engine without a clock thread.

use std::sync::{Arc, Mutex};

use bandhub_transport::{Command, MediaLink, MediaOpener, SourceLink, Status, media_link};

#[derive(Clone, Default)]
pub struct FakeOpener {
    sources: Arc<Mutex<Vec<(String, SourceLink)>>>,
}

impl FakeOpener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn opened(&self) -> Vec<String> {
        let sources = self.sources.lock().unwrap();
        sources.iter().map(|(url, _)| url.clone()).collect()
    }

    /// Report a status from the most recently opened source.
    pub fn send(&self, status: Status) {
        let mut sources = self.sources.lock().unwrap();
        let (_, source) = sources.last_mut().expect("a source was opened");
        source.status.push(status).expect("status ring has room");
    }

    /// Commands received by the most recently opened source.
    pub fn commands(&self) -> Vec<Command> {
        let mut sources = self.sources.lock().unwrap();
        let (_, source) = sources.last_mut().expect("a source was opened");
        std::iter::from_fn(|| source.commands.pop().ok()).collect()
    }

    pub fn seeks(&self) -> Vec<f64> {
        self.commands()
            .into_iter()
            .filter_map(|c| match c {
                Command::Seek { seconds } => Some(seconds),
                _ => None,
            })
            .collect()
    }
}

impl MediaOpener for FakeOpener {
    fn open(&mut self, url: &str) -> anyhow::Result<MediaLink> {
        if url.contains("missing") {
            anyhow::bail!("cannot open {url}");
        }
        let (link, source) = media_link(64);
        self.sources
            .lock()
            .unwrap()
            .push((url.to_string(), source));
        Ok(link)
    }
}
