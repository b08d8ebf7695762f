//! Submission through the command-list extension.

use tracing::debug;

use crate::batch::{BatchList, TokenSources};
use crate::device::{CommandListDevice, ListId};
use crate::error::DrawListError;

/// A hardware-resident list built from client-side batches.
///
/// Any change to batch contents, addresses or surfaces requires [`CompiledCommandList::build`]
/// again before the next [`CompiledCommandList::call`].
#[derive(Debug, Default)]
pub struct CompiledCommandList {
    list: Option<ListId>,
}

impl CompiledCommandList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the list with one holding `batches`. An empty batch list leaves everything as is.
    pub fn build<D: CommandListDevice + ?Sized>(
        &mut self,
        device: &mut D,
        batches: &BatchList,
        sources: TokenSources<'_>,
    ) -> Result<(), DrawListError> {
        if batches.is_empty() {
            return Ok(());
        }
        let tokens = batches.client_tokens(sources)?;
        self.release(device);

        let list = device.create_command_list()?;
        self.list = Some(list);
        device.list_draw_commands_states_client(
            list,
            &tokens,
            batches.states(),
            batches.surfaces(),
        )?;
        device.compile_command_list(list)?;
        debug!(?list, batches = batches.len(), "command list compiled");
        Ok(())
    }

    pub fn call<D: CommandListDevice + ?Sized>(&self, device: &mut D) -> Result<(), DrawListError> {
        if let Some(list) = self.list {
            device.call_command_list(list)?;
        }
        Ok(())
    }

    pub fn id(&self) -> Option<ListId> {
        self.list
    }

    pub fn release<D: CommandListDevice + ?Sized>(&mut self, device: &mut D) {
        if let Some(list) = self.list.take() {
            device.delete_command_list(list);
        }
    }
}

/// Submit the first `cap` batches (all of them for `None`) by device address.
pub fn submit_indirect<D: CommandListDevice + ?Sized>(
    device: &mut D,
    batches: &BatchList,
    cap: Option<usize>,
) -> Result<(), DrawListError> {
    if batches.is_empty() {
        return Ok(());
    }
    let (addresses, sizes, states, surfaces) = batches.device_arrays(cap.unwrap_or(usize::MAX))?;
    device.draw_commands_states_address(addresses, sizes, states, surfaces)?;
    Ok(())
}
