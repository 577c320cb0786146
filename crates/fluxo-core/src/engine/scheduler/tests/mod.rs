use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::engine::QueueEngine;
use crate::error::{EngineError, HandlerError};
use crate::event::{handler_fn, Event, Handler};
use crate::queue::{QueueConfig, QueueType};

mod common;
use common::*;
