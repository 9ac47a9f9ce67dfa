use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use hoard_util::eyre::Result;

use crate::bundle::Bundle;
use crate::id::{BundleId, UntypedId};
use crate::loader::AnyAsset;
use crate::{Assets, LoadError};

pub type FetchResult = Result<Option<Box<dyn AnyAsset>>, LoadError>;

/// Work handed back to the thread owning [`Assets`], run by `maintain`.
pub enum Command {
    AssetFetched(UntypedId, FetchResult),
    BundleFetched(BundleId, Result<Box<dyn Bundle>>),
    Drain,
    Closure(Box<dyn FnOnce(&mut Assets) + Send>),
}

impl Command {
    pub fn execute(self, assets: &mut Assets) {
        match self {
            Command::AssetFetched(id, result) => {
                assets.finish_asset(id, result);
            }

            Command::BundleFetched(id, result) => {
                assets.finish_bundle(id, result);
            }

            Command::Drain => {
                assets.drain_callbacks();
            }

            Command::Closure(closure) => {
                closure(assets);
            }
        }
    }
}

pub fn new_command_channel() -> (CommandSender, CommandReceiver) {
    let (sender, receiver) = crossbeam_channel::unbounded();
    (CommandSender { sender }, CommandReceiver { receiver })
}

#[derive(Debug, Clone)]
pub struct CommandSender {
    sender: Sender<Command>,
}

impl CommandSender {
    pub fn send(&self, command: Command) {
        let _ = self.sender.send(command);
    }

    pub fn asset_fetched(&self, id: UntypedId, result: FetchResult) {
        self.send(Command::AssetFetched(id, result));
    }

    pub fn bundle_fetched(&self, id: BundleId, result: Result<Box<dyn Bundle>>) {
        self.send(Command::BundleFetched(id, result));
    }

    pub fn drain(&self) {
        self.send(Command::Drain);
    }

    pub fn closure<F>(&self, command: F)
    where
        F: FnOnce(&mut Assets) + Send + 'static,
    {
        self.send(Command::Closure(Box::new(command)));
    }
}

#[derive(Debug)]
pub struct CommandReceiver {
    receiver: Receiver<Command>,
}

impl CommandReceiver {
    pub fn try_recv(&self) -> Option<Command> {
        self.receiver.try_recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<Command> {
        self.receiver.recv_timeout(timeout).ok()
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }
}
