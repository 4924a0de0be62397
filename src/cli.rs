//! Command-line interface and REPL

use anyhow::{anyhow, bail, Context, Result};
use rustyline::DefaultEditor;
use serde_json::Value;
use state_reflector::bridge::{BridgeListener, HostChannel, SyncBridge, PING};
use state_reflector::state::{Binding, SharedKey};
use std::collections::HashMap;

/// One REPL command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Bind { key: String, initial: Option<Value> },
    Set { key: String, value: Value },
    Field { key: String, path: String, value: Value },
    Get { key: String },
    Recv { raw: String },
    Keys,
    Help,
    Quit,
}

const HELP: &str = "\
bind <key> [json]          bind to a key (joins existing state)
set <key> <json>           replace the value
field <key> <path> <json>  write a nested field (reconciled strategy)
get <key>                  show the current value
recv <raw>                 feed a raw message as if sent by the host
keys                       list bound keys
quit                       exit";

fn parse_json(text: &str) -> Result<Value> {
    serde_json::from_str(text).with_context(|| format!("Invalid JSON: {}", text))
}

fn split_word(text: &str) -> (&str, &str) {
    match text.trim().split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (text.trim(), ""),
    }
}

/// Parse one REPL line
pub fn parse_command(line: &str) -> Result<Command> {
    let (name, rest) = split_word(line);
    let (key, args) = split_word(rest);
    let need_key = || -> Result<String> {
        if key.is_empty() {
            bail!("'{}' needs a key", name);
        }
        Ok(key.to_string())
    };

    Ok(match name {
        "bind" => Command::Bind {
            key: need_key()?,
            initial: if args.is_empty() { None } else { Some(parse_json(args)?) },
        },
        "set" => Command::Set {
            key: need_key()?,
            value: parse_json(args)?,
        },
        "field" => {
            let (path, json) = split_word(args);
            if path.is_empty() {
                bail!("'field' needs a path");
            }
            Command::Field {
                key: need_key()?,
                path: path.to_string(),
                value: parse_json(json)?,
            }
        }
        "get" => Command::Get { key: need_key()? },
        "recv" => {
            if rest.is_empty() {
                bail!("'recv' needs a message");
            }
            Command::Recv { raw: rest.to_string() }
        }
        "keys" => Command::Keys,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => return Err(anyhow!("Unknown command: {} (try 'help')", other)),
    })
}

/// Host channel that prints every outbound message for the REPL user
pub struct PrintChannel;

impl HostChannel for PrintChannel {
    fn post_message(&self, message: &str) -> state_reflector::error::Result<()> {
        println!("→ host: {}", message);
        Ok(())
    }

    fn ping(&self) -> state_reflector::error::Result<()> {
        println!("→ host: {}", PING);
        Ok(())
    }
}

fn execute(
    command: Command,
    bridge: &SyncBridge,
    listener: &BridgeListener,
    bindings: &mut HashMap<String, Binding>,
) -> Result<()> {
    let bound = |bindings: &HashMap<String, Binding>, key: &str| -> Result<()> {
        if bindings.contains_key(key) {
            Ok(())
        } else {
            bail!("Key '{}' is not bound here (use 'bind {}')", key, key)
        }
    };

    match command {
        Command::Bind { key, initial } => {
            if bindings.contains_key(&key) {
                bail!("Key '{}' is already bound", key);
            }
            let binding = bridge.bind(Some(&key), initial);
            println!("{} = {}", key, binding.value());
            bindings.insert(key, binding);
        }
        Command::Set { key, value } => {
            bound(bindings, &key)?;
            if let Some(binding) = bindings.get(&key) {
                binding.set(value);
                println!("{} = {}", key, binding.value());
            }
        }
        Command::Field { key, path, value } => {
            bound(bindings, &key)?;
            if let Some(binding) = bindings.get(&key) {
                if !binding.set_path(&path, value) {
                    println!("(no change: unchanged value, missing path or untracked value)");
                }
                println!("{} = {}", key, binding.value());
            }
        }
        Command::Get { key } => match bridge.registry().current(&SharedKey::from(key.as_str())) {
            Some(value) => println!("{} = {}", key, value),
            None => println!("{} is not bound", key),
        },
        Command::Recv { raw } => {
            let outcome = listener.handle_message(&raw);
            println!("← {:?}", outcome);
        }
        Command::Keys => {
            for key in bridge.registry().keys() {
                println!("{}", key);
            }
        }
        Command::Help => println!("{}", HELP),
        Command::Quit => {}
    }
    Ok(())
}

pub async fn run_repl(bridge: &SyncBridge, listener: &BridgeListener) -> Result<()> {
    let mut rl = DefaultEditor::new()?;
    let mut bindings: HashMap<String, Binding> = bridge
        .bind_seeds()
        .into_iter()
        .map(|binding| (binding.key().to_string(), binding))
        .collect();

    loop {
        let readline = rl.readline("reflector> ");
        match readline {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(line.as_str());

                match parse_command(&line) {
                    Ok(Command::Quit) => break,
                    Ok(command) => {
                        if let Err(e) = execute(command, bridge, listener, &mut bindings) {
                            println!("error: {:#}", e);
                        }
                    }
                    Err(e) => println!("error: {:#}", e),
                }
            }
            Err(_) => break,
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_bind() {
        assert_eq!(
            parse_command("bind cart {\"items\": []}").unwrap(),
            Command::Bind {
                key: "cart".to_string(),
                initial: Some(json!({"items": []})),
            }
        );
        assert_eq!(
            parse_command("  bind cart  ").unwrap(),
            Command::Bind {
                key: "cart".to_string(),
                initial: None,
            }
        );
    }

    #[test]
    fn test_parse_field() {
        assert_eq!(
            parse_command("field cart items.0 \"x\"").unwrap(),
            Command::Field {
                key: "cart".to_string(),
                path: "items.0".to_string(),
                value: json!("x"),
            }
        );
        assert!(parse_command("field cart").is_err());
    }

    #[test]
    fn test_parse_recv_keeps_raw_message() {
        let raw = r#"{"type":"SHARED_STATE_UPDATE_FROM_NATIVE","key":"k","value":{"a b":1}}"#;
        assert_eq!(
            parse_command(&format!("recv {}", raw)).unwrap(),
            Command::Recv { raw: raw.to_string() }
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_command("set cart {broken").is_err());
        assert!(parse_command("get").is_err());
        assert!(parse_command("frobnicate").is_err());
        assert_eq!(parse_command("exit").unwrap(), Command::Quit);
    }

    #[test]
    fn test_execute_set_and_recv() {
        let bridge = SyncBridge::create(Default::default(), None);
        let listener = bridge.install_listener().unwrap();
        let mut bindings = HashMap::new();

        execute(parse_command("bind k 1").unwrap(), &bridge, &listener, &mut bindings).unwrap();
        execute(parse_command("set k 2").unwrap(), &bridge, &listener, &mut bindings).unwrap();
        assert_eq!(bindings["k"].value(), json!(2));

        let recv = r#"recv {"type":"SHARED_STATE_UPDATE_FROM_NATIVE","key":"k","value":3}"#;
        execute(parse_command(recv).unwrap(), &bridge, &listener, &mut bindings).unwrap();
        assert_eq!(bindings["k"].value(), json!(3));

        assert!(execute(parse_command("set other 1").unwrap(), &bridge, &listener, &mut bindings).is_err());
    }
}
