//! The reference opcode set.
//!
//! Each row names an opcode id, its listing mnemonic, its operand shape, whether it ends with a
//! destination slot and the handler that implements it. The same table produces the metadata used
//! by the disassembler and the handler registry used by the dispatch loop, so the two never drift.

use tagvm_core::vm::{HandlerRegistry, OpcodeMap, OpcodeMeta, OperandClass};

use crate::{arith, compare, control, host, object};

macro_rules! opcodes {
    ($( $id:literal => $name:ident, $op:literal, $class:expr, $writes:literal, $handler:path, $desc:literal; )*) => {
        $( pub const $name: i32 = $id; )*

        pub(crate) fn reference_map() -> OpcodeMap {
            let mut map = OpcodeMap::new();
            $(
                map.insert(
                    $id,
                    OpcodeMeta::new(stringify!($name), $op, $class, $writes).with_description($desc),
                );
            )*
            map
        }

        pub(crate) fn register_all(registry: &mut HandlerRegistry) {
            $( registry.register(stringify!($name), $handler); )*
        }
    };
}

opcodes! {
    0 => STRICT_EQUAL, "===", OperandClass::Binary, true, compare::strict_equal, "identity comparison";
    1 => INSTANCEOF, "instanceof", OperandClass::Binary, true, compare::instance_of, "container kind check against a constructor name";
    2 => MULTIPLY, "*", OperandClass::Binary, true, arith::multiply, "multiplication";
    3 => EQUAL, "==", OperandClass::Binary, true, compare::equal, "coercing comparison";
    4 => NOT_EQUAL, "!=", OperandClass::Binary, true, compare::not_equal, "negated coercing comparison";
    5 => LESS_THAN, "<", OperandClass::Binary, true, compare::less_than, "ordering";
    6 => GREATER_THAN, ">", OperandClass::Binary, true, compare::greater_than, "ordering";
    7 => ADD, "+", OperandClass::Binary, true, arith::add, "addition or string concatenation";
    8 => SUBTRACT, "-", OperandClass::Binary, true, arith::subtract, "subtraction";
    9 => DIVIDE, "/", OperandClass::Binary, true, arith::divide, "division";
    10 => MODULO, "%", OperandClass::Binary, true, arith::modulo, "remainder";
    11 => BITWISE_AND, "&", OperandClass::Binary, true, arith::bitwise_and, "32-bit and";
    12 => BITWISE_OR, "|", OperandClass::Binary, true, arith::bitwise_or, "32-bit or";
    13 => BITWISE_XOR, "^", OperandClass::Binary, true, arith::bitwise_xor, "32-bit xor";
    14 => LEFT_SHIFT, "<<", OperandClass::Binary, true, arith::left_shift, "32-bit shift left";
    15 => RIGHT_SHIFT, ">>", OperandClass::Binary, true, arith::right_shift, "32-bit arithmetic shift right";
    16 => LOGICAL_NOT, "!", OperandClass::Unary, true, compare::logical_not, "truthiness negation";
    17 => UNARY_PLUS, "+x", OperandClass::Unary, true, arith::unary_plus, "numeric coercion";
    18 => PROPERTY_GET, ".", OperandClass::Binary, true, object::property_get, "property read";
    19 => PROPERTY_SET, ".=", OperandClass::Ternary, false, object::property_set, "property write through a variable";
    20 => CALL_FUNCTION, "call", OperandClass::Call { args: 1 }, true, control::call_1, "call with one argument";
    21 => NEW_ARRAY, "[]", OperandClass::Nullary, true, object::new_array, "empty list";
    22 => NEW_OBJECT, "{}", OperandClass::Nullary, true, object::new_object, "empty map";
    23 => JUMP, "goto", OperandClass::Jump, false, control::jump, "unconditional jump";
    24 => JUMP_IF_FALSE, "if not", OperandClass::Branch, false, control::jump_if_false, "jump when falsy";
    25 => RETURN, "return", OperandClass::Unary, false, control::ret, "leave the current call";
    26 => THROW, "throw", OperandClass::Unary, false, control::throw, "raise an exception";
    27 => LOAD_VAR, "load", OperandClass::Unary, true, object::load_var, "copy a variable";
    28 => STORE_VAR, "store", OperandClass::Binary, false, object::store_var, "assign to the innermost binding";
    29 => LOAD_CONST, "const", OperandClass::Unary, true, object::load_const, "load a constant";
    30 => JUMP_IF_TRUE, "if", OperandClass::Branch, false, control::jump_if_true, "jump when truthy";
    31 => TYPEOF, "typeof", OperandClass::Unary, true, compare::type_of, "type name";
    32 => TRY_ENTER, "try", OperandClass::Jump, false, control::try_enter, "open a scope with a handler target";
    33 => TRY_EXIT, "end try", OperandClass::Nullary, false, control::try_exit, "close the current scope";
    34 => GET_EXCEPTION, "catch", OperandClass::Nullary, true, control::get_exception, "read the pending exception";
    35 => CLEAR_EXCEPTION, "clear", OperandClass::Nullary, false, control::clear_exception, "drop the pending exception";
    36 => HOST_CALL, "host", OperandClass::Call { args: 1 }, true, host::host_call_1, "host capability with one argument";
    37 => HALT, "halt", OperandClass::Nullary, false, control::halt, "stop the run";
    38 => CALL_FUNC_0ARGS, "call", OperandClass::Call { args: 0 }, true, control::call_0, "call without arguments";
    39 => CALL_FUNC_2ARGS, "call", OperandClass::Call { args: 2 }, true, control::call_2, "call with two arguments";
    40 => BITWISE_NOT, "~", OperandClass::Unary, true, arith::bitwise_not, "32-bit complement";
    41 => STRICT_NOT_EQUAL, "!==", OperandClass::Binary, true, compare::strict_not_equal, "negated identity comparison";
    42 => HOST_CALL_2ARGS, "host", OperandClass::Call { args: 2 }, true, host::host_call_2, "host capability with two arguments";
}
