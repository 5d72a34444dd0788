#![no_main]

use keyharden::InstructionTable;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(table) = InstructionTable::from_text(text) {
        // Whatever parses must survive its own textual form.
        let reparsed = InstructionTable::from_text(&table.to_text()).expect("re-parse");
        assert_eq!(reparsed, table);
    }
});
