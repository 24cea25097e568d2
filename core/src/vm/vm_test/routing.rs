use super::*;

fn three_frames() -> Context {
    let mut ctx = Context::new(16);
    ctx.set_ip(1);
    ctx.set_handler(9).unwrap();
    ctx.push_frame(None).unwrap();
    ctx.store(0, Val::from("middle"));
    ctx.push_frame(None).unwrap();
    ctx.store(0, Val::from("inner"));
    ctx
}

#[test]
fn exception_reaches_root_handler() {
    let mut ctx = three_frames();
    let recovered = raise(&mut ctx, Val::from("boom"), 0).unwrap();
    assert_eq!(recovered.frame, 0);
    assert_eq!(recovered.target, 9);
    assert_eq!(recovered.released.len(), 2);
    // released frames are handed back untouched
    assert_eq!(recovered.released[0].local(0), Some(&Val::from("middle")));
    assert_eq!(recovered.released[1].local(0), Some(&Val::from("inner")));
    assert!(recovered.released.iter().all(|frame| frame.handler.is_none()));

    assert_eq!(ctx.depth(), 1);
    assert_eq!(ctx.ip(), 9);
    assert_eq!(ctx.pending(), Some(&Val::from("boom")));
    assert_eq!(ctx.current().handler, Some(9));
}

#[test]
fn nearest_handler_wins() {
    let mut ctx = three_frames();
    // give the middle frame its own handler
    ctx.pop_frame();
    ctx.set_handler(12).unwrap();
    ctx.push_frame(None).unwrap();

    let recovered = raise(&mut ctx, Val::Int(1), 0).unwrap();
    assert_eq!(recovered.frame, 1);
    assert_eq!(recovered.released.len(), 1);
    assert_eq!(ctx.ip(), 12);
    assert_eq!(ctx.frame(0).unwrap().handler, Some(9));
}

#[test]
fn handler_stays_armed_until_cleared() {
    let mut ctx = Context::new(4);
    ctx.set_handler(2).unwrap();
    raise(&mut ctx, Val::Int(1), 0).unwrap();
    let again = raise(&mut ctx, Val::Int(2), 0).unwrap();
    assert_eq!(again.target, 2);
    assert_eq!(ctx.pending(), Some(&Val::Int(2)));

    assert_eq!(ctx.clear_handler(), Some(2));
    assert_eq!(raise(&mut ctx, Val::Int(3), 0), Err(Val::Int(3)));
}

#[test]
fn floor_hides_outer_handlers() {
    let mut ctx = three_frames();
    let err = raise(&mut ctx, Val::Nil, 1).unwrap_err();
    assert_eq!(err, Val::Nil);
    assert_eq!(ctx.depth(), 3);
    assert_eq!(ctx.frame(0).unwrap().handler, Some(9));
}

#[test]
fn no_handler_anywhere() {
    let mut ctx = Context::new(4);
    ctx.push_frame(None).unwrap();
    assert_eq!(raise(&mut ctx, Val::Bool(false), 0), Err(Val::Bool(false)));
    assert_eq!(ctx.depth(), 2);
}
