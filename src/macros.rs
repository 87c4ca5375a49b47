macro_rules! emit {
    ($output:expr, $opcode:expr) => {
        writeln!($output, "\t{}", $opcode)
    };

    ($output:expr, $opcode:expr, $($format:tt)*) => {{
        write!($output, "\t{:12}", $opcode)?;
        writeln!($output, $($format)*)
    }};
}
