use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bandhub_decode::{DecodeError, PeakExtraction, extract_peaks_from_file};
use bandhub_store::AssetId;
use crossbeam::channel::{self, Receiver, TryRecvError};

/// Background peak extraction for one asset, run on the rayon pool.
///
/// Dropping the job cancels it; the decoder stops at the next packet boundary.
#[derive(Debug)]
pub struct PeakJob {
    asset: AssetId,
    cancel: Arc<AtomicBool>,
    result: Receiver<Result<PeakExtraction, DecodeError>>,
}

impl PeakJob {
    pub fn spawn(asset: AssetId, path: PathBuf, count: usize) -> Self {
        let cancel = Arc::new(AtomicBool::new(false));
        let (sender, result) = channel::bounded(1);

        let flag = Arc::clone(&cancel);
        let job_asset = asset.clone();
        rayon::spawn(move || {
            let extraction = extract_peaks_from_file(&path, count, &flag);
            match &extraction {
                Ok(_) => log::debug!("peaks ready for {job_asset}"),
                Err(DecodeError::Cancelled) => log::debug!("peak job for {job_asset} cancelled"),
                Err(e) => log::warn!("peak extraction for {job_asset} failed: {e}"),
            }
            let _ = sender.send(extraction);
        });

        Self {
            asset,
            cancel,
            result,
        }
    }

    pub fn asset(&self) -> &AssetId {
        &self.asset
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// The result, if the job has finished.
    pub fn try_finish(&self) -> Option<Result<PeakExtraction, DecodeError>> {
        match self.result.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(DecodeError::Cancelled)),
        }
    }

    /// Block until the job finishes.
    pub fn wait(&self) -> Result<PeakExtraction, DecodeError> {
        self.result.recv().unwrap_or(Err(DecodeError::Cancelled))
    }
}

impl Drop for PeakJob {
    fn drop(&mut self) {
        self.cancel();
    }
}
