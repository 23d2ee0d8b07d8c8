//
// Copyright (c) The Nacre Core Contributors
//
// SPDX-License-Identifier: MIT
//

pub mod file;
pub mod task;

use tokio::sync::oneshot;

/// Channel endpoint used to reply to a single request message.
pub type Responder<T> = oneshot::Sender<T>;
