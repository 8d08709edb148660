#![no_main]

use libfuzzer_sys::fuzz_target;
use pipebot_command::{is_valid_command_name, GrammarConfig, RawCommandParser};

fuzz_target!(|data: &[u8]| {
    let raw = String::from_utf8_lossy(data);
    let parser = RawCommandParser::new(GrammarConfig::default());
    for command in parser.parse(&raw) {
        assert!(is_valid_command_name(&command.name));
        assert!(command.entity_id.as_deref().map_or(true, |id| !id.is_empty()));
        assert!(command.named_arguments.keys().all(|key| !key.is_empty()));
    }
});
