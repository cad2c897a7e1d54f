//! Fuzz target for header chain dissection.
//!
//! Every built-in descriptor and binding is reachable from one of the link
//! types below. Checks that dissection never panics, never exceeds the
//! record limit, and that records stay inside the buffer.

#![no_main]

use std::sync::{Arc, OnceLock};

use libfuzzer_sys::fuzz_target;
use framewalk_core::{default_registry, link_type, Dissector, LinkTypeMap};

fn setup() -> &'static (Dissector, LinkTypeMap) {
    static SETUP: OnceLock<(Dissector, LinkTypeMap)> = OnceLock::new();
    SETUP.get_or_init(|| {
        let registry = Arc::new(default_registry());
        let map = LinkTypeMap::for_registry(&registry);
        (Dissector::new(registry), map)
    })
}

fuzz_target!(|data: &[u8]| {
    let (dissector, map) = setup();
    let mut chain = dissector.new_chain();

    for lt in [link_type::ETHERNET, link_type::LINUX_SLL, link_type::RAW_IP] {
        let Ok(root) = map.root_for(lt, data) else {
            continue;
        };
        let n = dissector.dissect(data, root, &mut chain);
        assert!(n <= chain.max_headers());
        for record in chain.iter() {
            assert!(record.end() <= data.len());
        }
        for sub in chain.iter().filter_map(|r| chain.sub_headers(r)) {
            assert!(sub.len() <= 64);
        }
    }
});
