#[cfg(test)]
mod tests {
    use anyhow::Result;
    use tagvm_core::{Fault, Val};

    use crate::opcodes::*;
    use crate::{HostStorage, standard_host, standard_host_with};
    use crate::test_util::{NULL, int, run, slot, text};

    #[test]
    fn test_standard_capabilities_are_registered() {
        let host = standard_host();
        assert_eq!(
            host.names(),
            vec![
                "clock.now",
                "console.log",
                "storage.get",
                "storage.remove",
                "storage.set",
                "string.length"
            ]
        );
    }

    #[test]
    fn test_string_length_counts_utf16_units() -> Result<()> {
        let host = standard_host();
        assert_eq!(host.call("string.length", &[Val::from("héllo")])?, Val::Int(5));
        assert_eq!(host.call("string.length", &[Val::from("😀")])?, Val::Int(2));
        assert!(host.call("string.length", &[Val::Int(1)]).is_err());
        Ok(())
    }

    #[test]
    fn test_storage_roundtrip_through_bytecode() -> Result<()> {
        let key = "roundtrip";
        let program = [
            vec![HOST_CALL_2ARGS],
            text("storage.set"),
            text(key),
            vec![int(12), slot(0), HOST_CALL],
            text("storage.get"),
            text(key),
            vec![slot(1), HOST_CALL],
            text("storage.remove"),
            text(key),
            vec![slot(2), HOST_CALL],
            text("storage.get"),
            text(key),
            vec![slot(3), HALT],
        ]
        .concat();
        let (outcome, ctx) = run(program)?;
        assert!(outcome.fault.is_none(), "{:?}", outcome.fault);
        assert_eq!(ctx.resolve(0), Some(&Val::Undefined));
        assert_eq!(ctx.resolve(1), Some(&Val::from("12")));
        assert_eq!(ctx.resolve(3), Some(&Val::Nil));
        Ok(())
    }

    #[test]
    fn test_hosts_do_not_share_storage() -> Result<()> {
        let first = standard_host();
        let second = standard_host();
        first.call("storage.set", &[Val::from("k"), Val::Int(1)])?;
        assert_eq!(first.call("storage.get", &[Val::from("k")])?, Val::from("1"));
        assert_eq!(second.call("storage.get", &[Val::from("k")])?, Val::Nil);
        Ok(())
    }

    #[test]
    fn test_shared_storage_is_visible_to_embedder() -> Result<()> {
        let storage = HostStorage::new();
        let host = standard_host_with(&storage);
        host.call("storage.set", &[Val::from("answer"), Val::Int(42)])?;
        assert_eq!(storage.get("answer"), Some(Val::from("42")));
        host.call("storage.remove", &[Val::from("answer")])?;
        assert!(storage.is_empty());
        assert!(host.call("storage.get", &[]).is_err());
        Ok(())
    }

    #[test]
    fn test_clock_now_is_epoch_millis() -> Result<()> {
        let program = [vec![HOST_CALL], text("clock.now"), vec![NULL, slot(0), HALT]].concat();
        let (_, ctx) = run(program)?;
        match ctx.resolve(0) {
            Some(Val::Int(ms)) => assert!(*ms > 1_600_000_000_000),
            other => panic!("unexpected {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn test_console_log_returns_undefined() -> Result<()> {
        let host = standard_host();
        assert_eq!(host.call("console.log", &[Val::from("hi"), Val::Int(1)])?, Val::Undefined);
        Ok(())
    }

    #[test]
    fn test_unknown_capability_is_an_exception() -> Result<()> {
        let program = [vec![HOST_CALL], text("nope"), vec![NULL, slot(0)]].concat();
        let (outcome, _) = run(program)?;
        match outcome.fault {
            Some(Fault::UnhandledRuntimeException { value: Val::Str(msg) }) => {
                assert!(msg.contains("Unknown host capability: nope"))
            }
            other => panic!("unexpected {:?}", other),
        }
        Ok(())
    }
}
