//! Listing session: enumerate catalog descriptors to a reply channel.

use std::rc::Rc;

use anyhow::Result;
use tracing::warn;

use waxproto::Notification;

use crate::catalog::Catalog;
use crate::dispatch::offer_notification;
use crate::session::{Session, SessionRegistry};
use crate::transport::Publication;

/// Unit of work enumerating descriptors in the half-open id range
/// [cursor, end), one per cycle. Lives only in the generic live set - it
/// owns no keyed index entry.
pub struct ListSession {
    catalog: Rc<dyn Catalog>,
    reply: Box<dyn Publication>,
    cursor: i64,
    end: i64,
    done: bool,
    aborted: bool,
}

impl ListSession {
    pub fn new(catalog: Rc<dyn Catalog>, reply: Box<dyn Publication>, from: i64, to: i64) -> Self {
        Self {
            catalog,
            reply,
            cursor: from,
            end: to,
            done: false,
            aborted: false,
        }
    }

    fn complete(&mut self) {
        if let Err(e) = self.reply.close() {
            warn!("failed to close listing reply publication: {e:#}");
        }
        self.done = true;
    }
}

impl Session for ListSession {
    fn abort(&mut self) {
        self.aborted = true;
    }

    fn is_done(&self) -> bool {
        self.done
    }

    fn detach(&mut self, _registry: &mut SessionRegistry) {}

    fn do_work(&mut self) -> Result<usize> {
        if self.done {
            return Ok(0);
        }
        if self.aborted || self.cursor >= self.end {
            self.complete();
            return Ok(1);
        }

        let max = self.catalog.max_stream_instance_id();
        if self.cursor > max {
            let miss = Notification::DescriptorNotFound {
                stream_instance_id: self.cursor,
                max_stream_instance_id: max,
            };
            if !offer_notification(self.reply.as_mut(), &miss) {
                return Ok(0);
            }
            self.complete();
            return Ok(1);
        }

        match self.catalog.read_descriptor(self.cursor) {
            Ok(Some(descriptor)) => {
                let out = Notification::Descriptor { descriptor };
                if !offer_notification(self.reply.as_mut(), &out) {
                    // Reply channel pushed back; same id again next cycle.
                    return Ok(0);
                }
                self.cursor += 1;
                Ok(1)
            }
            Ok(None) => {
                // Hole in the id sequence; nothing to send for it.
                self.cursor += 1;
                Ok(1)
            }
            Err(e) => {
                warn!(cursor = self.cursor, "catalog read failed, ending listing: {e:#}");
                self.complete();
                Ok(1)
            }
        }
    }
}
