//! English-prose descriptions of decoded instructions, substituting back any
//! label whose address matches the operand (so `jne loop` reads naturally
//! instead of `jne 0x14`).

use std::collections::HashMap;

use x86sim_asm::decoded::{DecodedInstruction, DecodedOperand};

/// Reverse of the assembler's symbol table: address → label, used to print
/// jump/call targets by name when one exists.
pub fn reverse_symbols(symbols: &HashMap<String, u64>) -> HashMap<u64, String> {
    symbols.iter().map(|(label, addr)| (*addr, label.clone())).collect()
}

fn operand_text(operand: &DecodedOperand, labels: &HashMap<u64, String>) -> String {
    if let Some(addr) = operand.value() {
        if let Some(label) = labels.get(&addr) {
            return label.clone();
        }
    }
    operand.text().to_string()
}

/// Produce a one-sentence description of `instr`, e.g.
/// `"add eax, ecx: adds ecx into eax"`.
pub fn describe(instr: &DecodedInstruction, labels: &HashMap<u64, String>) -> String {
    let ops: Vec<String> = instr.operands.iter().map(|o| operand_text(o, labels)).collect();
    let prose = match instr.mnemonic.as_str() {
        "mov" if ops.len() == 2 => format!("loads {} into {}", ops[1], ops[0]),
        "add" if ops.len() == 2 => format!("adds {} into {}", ops[1], ops[0]),
        "sub" if ops.len() == 2 => format!("subtracts {} from {}", ops[1], ops[0]),
        "and" if ops.len() == 2 => format!("bitwise-ands {} into {}", ops[1], ops[0]),
        "or" if ops.len() == 2 => format!("bitwise-ors {} into {}", ops[1], ops[0]),
        "xor" if ops.len() == 2 => format!("bitwise-xors {} into {}", ops[1], ops[0]),
        "cmp" if ops.len() == 2 => format!("compares {} against {}", ops[0], ops[1]),
        "inc" if ops.len() == 1 => format!("increments {}", ops[0]),
        "dec" if ops.len() == 1 => format!("decrements {}", ops[0]),
        "not" if ops.len() == 1 => format!("bitwise-complements {}", ops[0]),
        "mul" if ops.len() == 1 => format!("multiplies eax by {}, widening into edx:eax", ops[0]),
        "div" if ops.len() == 1 => format!("divides edx:eax by {}, quotient in eax, remainder in edx", ops[0]),
        "jmp" if ops.len() == 1 => format!("jumps unconditionally to {}", ops[0]),
        "je" if ops.len() == 1 => format!("jumps to {} if equal", ops[0]),
        "jne" if ops.len() == 1 => format!("jumps to {} if not equal", ops[0]),
        "jl" if ops.len() == 1 => format!("jumps to {} if less", ops[0]),
        "jge" if ops.len() == 1 => format!("jumps to {} if greater or equal", ops[0]),
        "jg" if ops.len() == 1 => format!("jumps to {} if greater", ops[0]),
        "jle" if ops.len() == 1 => format!("jumps to {} if less or equal", ops[0]),
        "push" if ops.len() == 1 => format!("pushes {} onto the stack", ops[0]),
        "pop" if ops.len() == 1 => format!("pops the stack into {}", ops[0]),
        "int" if ops.len() == 1 => format!("raises interrupt {}", ops[0]),
        "in" if ops.len() == 2 => format!("reads a byte from port {} into {}", ops[1], ops[0]),
        "out" if ops.len() == 2 => format!("writes {} to port {}", ops[1], ops[0]),
        "nop" => "does nothing".to_string(),
        "vaddps" if ops.len() == 3 => format!("adds {} and {} lanewise into {}", ops[1], ops[2], ops[0]),
        "vsubps" if ops.len() == 3 => format!("subtracts {} from {} lanewise into {}", ops[2], ops[1], ops[0]),
        "vmovups" if ops.len() == 2 => format!("moves {} into {}", ops[1], ops[0]),
        "vzeroupper" => "zeroes the upper 128 bits of every ymm register".to_string(),
        _ => format!("executes {}", instr.mnemonic),
    };
    let operand_list = ops.join(", ");
    if operand_list.is_empty() {
        format!("{}: {}", instr.mnemonic, prose)
    } else {
        format!("{} {}: {}", instr.mnemonic, operand_list, prose)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jump_target_prints_the_label_when_one_resolves_to_it() {
        let mut symbols = HashMap::new();
        symbols.insert("loop".to_string(), 0x10u64);
        let labels = reverse_symbols(&symbols);
        let instr = DecodedInstruction::new(0, "jne", vec![DecodedOperand::Immediate { value: 0x10, text: "0x10".into() }], 2);
        assert_eq!(describe(&instr, &labels), "jne loop: jumps to loop if not equal");
    }

    #[test]
    fn add_reads_as_destination_first_sentence() {
        let labels = HashMap::new();
        let instr = DecodedInstruction::new(0, "add", vec![DecodedOperand::Register("eax".into()), DecodedOperand::Register("ecx".into())], 2);
        assert_eq!(describe(&instr, &labels), "add eax, ecx: adds ecx into eax");
    }
}
