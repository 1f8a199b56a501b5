//! One-shot completion handles.

use crossbeam_channel::{Receiver, Sender, TryRecvError, bounded};

use crate::error::{EngineError, EngineResult};

enum Inner {
    Ready,
    Deferred(Box<dyn FnOnce() -> EngineResult<()> + Send>),
    Channel(Receiver<EngineResult<()>>),
}

/// Something a caller can wait on exactly once.
///
/// Allocator policies return one alongside every new object to describe
/// initialization work still in progress; [`CowReset::spawn_on`] returns one
/// for the whole reset pipeline.
///
/// [`CowReset::spawn_on`]: crate::primitive::CowReset::spawn_on
#[must_use]
pub struct Completion(Inner);

impl Completion {
    /// Already satisfied.
    pub fn ready() -> Self {
        Self(Inner::Ready)
    }

    /// Satisfied by running `wait` on the waiting thread.
    pub fn from_fn(wait: impl FnOnce() -> EngineResult<()> + Send + 'static) -> Self {
        Self(Inner::Deferred(Box::new(wait)))
    }

    /// A completion satisfied by the returned signal.
    pub fn channel() -> (CompletionSignal, Self) {
        let (sender, receiver) = bounded(1);
        (CompletionSignal { sender }, Self(Inner::Channel(receiver)))
    }

    /// Blocks until satisfied.
    pub fn wait(self) -> EngineResult<()> {
        match self.0 {
            Inner::Ready => Ok(()),
            Inner::Deferred(wait) => wait(),
            Inner::Channel(receiver) => receiver.recv().unwrap_or_else(|_| {
                Err(EngineError::Primitive(
                    "completion signal dropped before it fired".to_string(),
                ))
            }),
        }
    }

    /// Returns the result if already satisfied, or the completion itself if
    /// it is still pending. A deferred completion runs its wait here.
    pub fn try_wait(self) -> Result<EngineResult<()>, Self> {
        match self.0 {
            Inner::Ready => Ok(Ok(())),
            Inner::Deferred(wait) => Ok(wait()),
            Inner::Channel(receiver) => match receiver.try_recv() {
                Ok(result) => Ok(result),
                Err(TryRecvError::Empty) => Err(Self(Inner::Channel(receiver))),
                Err(TryRecvError::Disconnected) => Ok(Err(EngineError::Primitive(
                    "completion signal dropped before it fired".to_string(),
                ))),
            },
        }
    }
}

/// Sending half of [`Completion::channel`].
pub struct CompletionSignal {
    sender: Sender<EngineResult<()>>,
}

impl CompletionSignal {
    pub fn signal(self) {
        self.finish(Ok(()));
    }

    pub fn finish(self, result: EngineResult<()>) {
        // The waiter may have gone away; nothing to report to.
        let _ = self.sender.send(result);
    }
}
