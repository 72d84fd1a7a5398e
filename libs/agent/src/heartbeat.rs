//! Idle heartbeat payload hook

use codec::{Message, ProtocolResult};

/// Application data attached to every heartbeat
pub trait HeartbeatHook: Send {
    fn data(&mut self) -> Vec<u8>;
}

impl<F> HeartbeatHook for F
where
    F: FnMut() -> Vec<u8> + Send,
{
    fn data(&mut self) -> Vec<u8> {
        self()
    }
}

/// Heartbeat frame carrying the hook's data, or no payload without a hook
pub fn build_heartbeat<H>(hook: Option<&mut H>) -> ProtocolResult<Message>
where
    H: HeartbeatHook + ?Sized,
{
    match hook {
        Some(hook) => Message::heartbeat(&hook.data()),
        None => Message::heartbeat(&[]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codec::SIMPLE_HEARTBEAT_MESSAGE;

    #[test]
    fn test_plain_heartbeat_has_no_payload() {
        let msg = build_heartbeat::<dyn HeartbeatHook>(None).unwrap();
        assert_eq!(msg.command(), SIMPLE_HEARTBEAT_MESSAGE);
        assert!(msg.is_empty());
    }

    #[test]
    fn test_hook_data_is_payload() {
        let mut counter = 0u32;
        let mut hook = move || {
            counter += 1;
            format!("app data {}", counter).into_bytes()
        };

        assert_eq!(build_heartbeat(Some(&mut hook)).unwrap().payload(), b"app data 1");
        assert_eq!(build_heartbeat(Some(&mut hook)).unwrap().payload(), b"app data 2");
    }
}
