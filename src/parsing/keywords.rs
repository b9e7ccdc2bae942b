//! Reserved words and compiler directives.
//!
//! Built once on first use and never mutated afterwards.

use std::collections::HashSet;
use std::sync::LazyLock;

const KEYWORD_LIST: &[&str] = &[
    "accept_on", "alias", "always", "always_comb", "always_ff", "always_latch", "and",
    "assert", "assign", "assume", "automatic", "before", "begin", "bind", "bins", "binsof",
    "bit", "break", "buf", "bufif0", "bufif1", "byte", "case", "casex", "casez", "cell",
    "chandle", "checker", "class", "clocking", "cmos", "config", "const", "constraint",
    "context", "continue", "cover", "covergroup", "coverpoint", "cross", "deassign",
    "default", "defparam", "design", "disable", "dist", "do", "edge", "else", "end",
    "endcase", "endchecker", "endclass", "endclocking", "endconfig", "endfunction",
    "endgenerate", "endgroup", "endinterface", "endmodule", "endpackage", "endprimitive",
    "endprogram", "endproperty", "endsequence", "endspecify", "endtable", "endtask", "enum",
    "event", "eventually", "expect", "export", "extends", "extern", "final", "first_match",
    "for", "force", "foreach", "forever", "fork", "forkjoin", "function", "generate",
    "genvar", "global", "highz0", "highz1", "if", "iff", "ifnone", "ignore_bins",
    "illegal_bins", "implements", "implies", "import", "incdir", "include", "initial",
    "inout", "input", "inside", "instance", "int", "integer", "interconnect", "interface",
    "intersect", "join", "join_any", "join_none", "large", "let", "liblist", "library",
    "local", "localparam", "logic", "longint", "macromodule", "matches", "medium",
    "modport", "module", "nand", "negedge", "nettype", "nexttime", "nmos", "nor",
    "noshowcancelled", "not", "notif0", "notif1", "null", "or", "output", "package",
    "packed", "parameter", "pmos", "posedge", "primitive", "priority", "program",
    "property", "protected", "pull0", "pull1", "pulldown", "pullup", "pulsestyle_ondetect",
    "pulsestyle_onevent", "pure", "rand", "randc", "randcase", "randsequence", "rcmos",
    "real", "realtime", "ref", "reg", "reject_on", "release", "repeat", "restrict",
    "return", "rnmos", "rpmos", "rtran", "rtranif0", "rtranif1", "s_always", "s_eventually",
    "s_nexttime", "s_until", "s_until_with", "scalared", "sequence", "shortint",
    "shortreal", "showcancelled", "signed", "small", "soft", "solve", "specify",
    "specparam", "static", "string", "strong", "strong0", "strong1", "struct", "super",
    "supply0", "supply1", "sync_accept_on", "sync_reject_on", "table", "tagged", "task",
    "this", "throughout", "time", "timeprecision", "timeunit", "tran", "tranif0",
    "tranif1", "tri", "tri0", "tri1", "triand", "trior", "trireg", "type", "typedef",
    "union", "unique", "unique0", "unsigned", "until", "until_with", "untyped", "use",
    "uwire", "var", "vectored", "virtual", "void", "wait", "wait_order", "wand", "weak",
    "weak0", "weak1", "while", "wildcard", "wire", "with", "within", "wor", "xnor", "xor",
];

const DIRECTIVE_LIST: &[&str] = &[
    "__FILE__", "__LINE__", "begin_keywords", "celldefine", "default_nettype", "define",
    "else", "elsif", "end_keywords", "endcelldefine", "endif", "ifdef", "ifndef", "include",
    "line", "nounconnected_drive", "pragma", "resetall", "timescale", "unconnected_drive",
    "undef", "undefineall",
];

/// Directives whose argument runs to the end of the line.
const LINE_ARGUMENT_DIRECTIVES: &[&str] = &[
    "begin_keywords", "default_nettype", "line", "pragma", "timescale", "unconnected_drive",
];

static KEYWORDS: LazyLock<HashSet<&'static str>> =
    LazyLock::new(|| KEYWORD_LIST.iter().copied().collect());

static DIRECTIVES: LazyLock<HashSet<&'static str>> =
    LazyLock::new(|| DIRECTIVE_LIST.iter().copied().collect());

pub fn is_keyword(word: &str) -> bool {
    KEYWORDS.contains(word)
}

pub fn is_directive(word: &str) -> bool {
    DIRECTIVES.contains(word)
}

pub fn takes_line_argument(directive: &str) -> bool {
    LINE_ARGUMENT_DIRECTIVES.contains(&directive)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_lookup() {
        assert!(is_keyword("endclass"));
        assert!(is_keyword("automatic"));
        assert!(!is_keyword("new"));
        assert!(!is_keyword("my_pkg"));
    }

    #[test]
    fn test_directive_lookup() {
        assert!(is_directive("ifdef"));
        assert!(is_directive("__FILE__"));
        assert!(!is_directive("uvm_info"));
        assert!(takes_line_argument("timescale"));
        assert!(!takes_line_argument("define"));
    }
}
