//! Built-in action handlers.

mod code;
mod dom;
mod http;
mod socket;
mod state;
mod storage;
mod timer;
mod tree;

pub use code::CodeRunAction;
pub use dom::DomEffectAction;
pub use http::{GraphqlQueryAction, HttpRequestAction};
pub use socket::{SocketConnectAction, SocketDisconnectAction, SocketSendAction};
pub use state::StateUpdateAction;
pub use storage::{StorageGetAction, StorageRemoveAction, StorageSetAction};
pub use timer::{ClearTimerAction, IntervalAction, TimeoutAction};
pub use tree::TreeInstantiateAction;

use crate::executor::{ActionRegistry, RegistrationError};

pub fn register_builtin_actions(registry: &mut ActionRegistry) -> Result<(), RegistrationError> {
    registry.register(HttpRequestAction)?;
    registry.register(GraphqlQueryAction)?;
    registry.register(SocketConnectAction)?;
    registry.register(SocketSendAction)?;
    registry.register(SocketDisconnectAction)?;
    registry.register(StateUpdateAction)?;
    registry.register(StorageSetAction)?;
    registry.register(StorageGetAction)?;
    registry.register(StorageRemoveAction)?;
    registry.register(DomEffectAction)?;
    registry.register(TimeoutAction)?;
    registry.register(IntervalAction)?;
    registry.register(ClearTimerAction)?;
    registry.register(CodeRunAction)?;
    registry.register(TreeInstantiateAction)?;
    Ok(())
}
